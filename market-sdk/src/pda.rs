//! Program-derived address computation.
//!
//! Single source of truth for every seed list the marketplace program uses.
//! Seed order, integer width and endianness are part of the wire contract:
//! a deviation silently targets a different account.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::constants::*;
use crate::errors::{SdkError, SdkResult};

/// Program ids the derivations run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramIds {
    pub marketplace: Pubkey,
    pub token: Pubkey,
    pub associated_token: Pubkey,
}

impl ProgramIds {
    pub fn new(marketplace: Pubkey) -> Self {
        Self {
            marketplace,
            token: SPL_TOKEN_PROGRAM_ID,
            associated_token: SPL_ASSOCIATED_TOKEN_PROGRAM_ID,
        }
    }
}

fn check_seeds(seeds: &[&[u8]]) -> SdkResult<()> {
    // One slot is reserved for the bump.
    if seeds.len() >= MAX_SEEDS {
        return Err(SdkError::InvalidSeed(format!(
            "{} seeds given, at most {} allowed",
            seeds.len(),
            MAX_SEEDS - 1
        )));
    }
    if let Some(s) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(SdkError::InvalidSeed(format!(
            "seed of {} bytes exceeds {MAX_SEED_LEN}",
            s.len()
        )));
    }
    Ok(())
}

/// sha256(seeds || bump || program_id || "ProgramDerivedAddress")
fn pda_digest(seeds: &[&[u8]], bump: u8, program_id: &Pubkey) -> [u8; 32] {
    let mut h = Sha256::new();
    for s in seeds {
        h.update(s);
    }
    h.update([bump]);
    h.update(program_id.as_ref());
    h.update(PDA_MARKER);
    h.finalize().into()
}

/// Derive the canonical (highest-bump) off-curve address for `seeds`.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    check_seeds(seeds)?;
    for bump in (0..=u8::MAX).rev() {
        let candidate = Pubkey::new_from_array(pda_digest(seeds, bump, program_id));
        if !candidate.is_on_curve() {
            return Ok((candidate, bump));
        }
    }
    tracing::error!(program_id = %program_id, "pda derivation exhausted every bump");
    Err(SdkError::AddressDerivationExhausted(*program_id))
}

/// Recompute an address from a known bump. Fails if the result lands on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    bump: u8,
    program_id: &Pubkey,
) -> SdkResult<Pubkey> {
    check_seeds(seeds)?;
    let candidate = Pubkey::new_from_array(pda_digest(seeds, bump, program_id));
    if candidate.is_on_curve() {
        return Err(SdkError::InvalidSeed(format!(
            "bump {bump} yields an on-curve address"
        )));
    }
    Ok(candidate)
}

// ---------------------------------------------------------------------
// Merchant / id space
// ---------------------------------------------------------------------

pub fn merchant_info_pda(program_id: &Pubkey, merchant: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[MERCHANT_INFO_SEED, merchant.as_ref()], program_id)
}

pub fn system_config_pda(program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[SYSTEM_CONFIG_SEED], program_id)
}

pub fn global_id_root_pda(program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[GLOBAL_ID_ROOT_SEED], program_id)
}

pub fn merchant_id_pda(program_id: &Pubkey, merchant: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[MERCHANT_ID_SEED, merchant.as_ref()], program_id)
}

pub fn id_chunk_pda(
    program_id: &Pubkey,
    merchant_id: u32,
    chunk_index: u32,
) -> SdkResult<(Pubkey, u8)> {
    find_program_address(
        &[
            ID_CHUNK_SEED,
            &merchant_id.to_le_bytes(),
            &chunk_index.to_le_bytes(),
        ],
        program_id,
    )
}

// ---------------------------------------------------------------------
// Catalog indices
// ---------------------------------------------------------------------

pub fn keyword_root_pda(program_id: &Pubkey, keyword: &str) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[KEYWORD_ROOT_SEED, keyword.as_bytes()], program_id)
}

pub fn keyword_shard_pda(
    program_id: &Pubkey,
    keyword: &str,
    shard_index: u32,
) -> SdkResult<(Pubkey, u8)> {
    find_program_address(
        &[
            KEYWORD_SHARD_SEED,
            keyword.as_bytes(),
            &shard_index.to_le_bytes(),
        ],
        program_id,
    )
}

pub fn price_index_pda(program_id: &Pubkey, range_start: u64) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[PRICE_INDEX_SEED, &range_start.to_le_bytes()], program_id)
}

pub fn sales_index_pda(program_id: &Pubkey, range_start: u64) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[SALES_INDEX_SEED, &range_start.to_le_bytes()], program_id)
}

// ---------------------------------------------------------------------
// Payments / vault / governance
// ---------------------------------------------------------------------

pub fn deposit_escrow_pda(program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[DEPOSIT_ESCROW_SEED], program_id)
}

pub fn vault_pda(program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[VAULT_SEED], program_id)
}

pub fn vault_depositor_pda(
    program_id: &Pubkey,
    vault: &Pubkey,
    depositor: &Pubkey,
) -> SdkResult<(Pubkey, u8)> {
    find_program_address(
        &[VAULT_DEPOSITOR_SEED, vault.as_ref(), depositor.as_ref()],
        program_id,
    )
}

pub fn vault_token_account_pda(program_id: &Pubkey, vault: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[VAULT_TOKEN_ACCOUNT_SEED, vault.as_ref()], program_id)
}

pub fn governance_config_pda(program_id: &Pubkey) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[GOVERNANCE_CONFIG_SEED], program_id)
}

pub fn proposal_pda(program_id: &Pubkey, proposal_id: u64) -> SdkResult<(Pubkey, u8)> {
    find_program_address(&[PROPOSAL_SEED, &proposal_id.to_le_bytes()], program_id)
}

/// Associated token account of `owner` for `mint`:
/// seeds `[owner, token_program, mint]` under the associated-token program.
pub fn associated_token_address(ids: &ProgramIds, owner: &Pubkey, mint: &Pubkey) -> SdkResult<Pubkey> {
    let (ata, _bump) = find_program_address(
        &[owner.as_ref(), ids.token.as_ref(), mint.as_ref()],
        &ids.associated_token,
    )?;
    Ok(ata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Pubkey {
        Pubkey::new_from_array([7u8; 32])
    }

    #[test]
    fn matches_runtime_derivation() {
        let pid = program();
        let merchant = Pubkey::new_from_array([3u8; 32]);
        let ours = merchant_id_pda(&pid, &merchant).unwrap();
        let runtime = Pubkey::find_program_address(&[b"merchant_id", merchant.as_ref()], &pid);
        assert_eq!(ours, runtime);

        let ours = id_chunk_pda(&pid, 42, 3).unwrap();
        let runtime = Pubkey::find_program_address(
            &[b"id_chunk", &42u32.to_le_bytes(), &3u32.to_le_bytes()],
            &pid,
        );
        assert_eq!(ours, runtime);
    }

    #[test]
    fn derivation_is_deterministic_and_off_curve() {
        let pid = program();
        for i in 0u64..200 {
            let seed = i.to_le_bytes();
            let a = find_program_address(&[b"proposal", &seed], &pid).unwrap();
            let b = find_program_address(&[b"proposal", &seed], &pid).unwrap();
            assert_eq!(a, b, "seed {i}");
            assert!(!a.0.is_on_curve(), "seed {i} produced an on-curve address");
            assert_eq!(create_program_address(&[b"proposal", &seed], a.1, &pid).unwrap(), a.0);
        }
    }

    #[test]
    fn seed_order_matters() {
        let pid = program();
        let vault = Pubkey::new_from_array([1u8; 32]);
        let user = Pubkey::new_from_array([2u8; 32]);
        let (a, _) = vault_depositor_pda(&pid, &vault, &user).unwrap();
        let (b, _) = vault_depositor_pda(&pid, &user, &vault).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_oversized_seeds() {
        let pid = program();
        let long = "k".repeat(33);
        assert!(matches!(
            keyword_root_pda(&pid, &long),
            Err(SdkError::InvalidSeed(_))
        ));
        let many: Vec<&[u8]> = vec![b"x"; MAX_SEEDS];
        assert!(matches!(
            find_program_address(&many, &pid),
            Err(SdkError::InvalidSeed(_))
        ));
    }

    #[test]
    fn associated_token_address_uses_ata_program() {
        let ids = ProgramIds::new(program());
        let owner = Pubkey::new_from_array([9u8; 32]);
        let mint = Pubkey::new_from_array([8u8; 32]);
        let ata = associated_token_address(&ids, &owner, &mint).unwrap();
        let (expected, _) = Pubkey::find_program_address(
            &[owner.as_ref(), SPL_TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
            &SPL_ASSOCIATED_TOKEN_PROGRAM_ID,
        );
        assert_eq!(ata, expected);
    }
}
