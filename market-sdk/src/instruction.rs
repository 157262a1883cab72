//! Vault instruction builders.
//!
//! Instruction data is the Anchor layout: `sha256("global:<name>")[..8]`
//! followed by the borsh-encoded arguments. Account order must match the
//! program's context structs.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
#[allow(deprecated)]
use solana_sdk::system_program;

use crate::errors::{SdkError, SdkResult};
use crate::pda::{associated_token_address, vault_depositor_pda, vault_pda, ProgramIds};
use crate::state::Vault;

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[derive(BorshSerialize)]
struct AmountArgs {
    amount: u64,
}

#[derive(BorshSerialize)]
struct SharesArgs {
    shares: u64,
}

fn instruction_data(name: &str, args: Option<&impl BorshSerialize>) -> SdkResult<Vec<u8>> {
    let mut data = Vec::with_capacity(8 + 8);
    data.extend_from_slice(&instruction_discriminator(name));
    if let Some(args) = args {
        args.serialize(&mut data)
            .map_err(|e| SdkError::InvalidArgument(format!("{name} args: {e}")))?;
    }
    Ok(data)
}

/// Addresses shared by every vault instruction, resolved once from a vault
/// snapshot.
#[derive(Debug, Clone)]
pub struct VaultInstructions {
    ids: ProgramIds,
    vault: Pubkey,
    stake_mint: Pubkey,
    vault_token_account: Pubkey,
    platform_account: Pubkey,
}

impl VaultInstructions {
    pub fn new(ids: ProgramIds, vault: &Vault) -> SdkResult<Self> {
        let (address, _) = vault_pda(&ids.marketplace)?;
        Ok(Self {
            ids,
            vault: address,
            stake_mint: vault.stake_mint,
            vault_token_account: vault.vault_token_account,
            platform_account: vault.platform_account,
        })
    }

    pub fn vault(&self) -> Pubkey {
        self.vault
    }

    fn depositor(&self, authority: &Pubkey) -> SdkResult<Pubkey> {
        Ok(vault_depositor_pda(&self.ids.marketplace, &self.vault, authority)?.0)
    }

    fn token_account(&self, owner: &Pubkey) -> SdkResult<Pubkey> {
        associated_token_address(&self.ids, owner, &self.stake_mint)
    }

    /// Accounts of every instruction that moves tokens out to the depositor.
    fn payout_accounts(&self, authority: &Pubkey) -> SdkResult<Vec<AccountMeta>> {
        Ok(vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new(self.depositor(authority)?, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(self.token_account(authority)?, false),
            AccountMeta::new(self.vault_token_account, false),
            AccountMeta::new_readonly(self.ids.token, false),
        ])
    }

    fn build(&self, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
        Instruction {
            program_id: self.ids.marketplace,
            accounts,
            data,
        }
    }

    /// The depositor pays for its position account on first stake.
    pub fn stake(&self, authority: &Pubkey, amount: u64) -> SdkResult<Instruction> {
        let accounts = vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new(self.depositor(authority)?, false),
            AccountMeta::new(*authority, true),
            AccountMeta::new(self.token_account(authority)?, false),
            AccountMeta::new(self.vault_token_account, false),
            AccountMeta::new_readonly(self.ids.token, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        let data = instruction_data("stake", Some(&AmountArgs { amount }))?;
        Ok(self.build(accounts, data))
    }

    pub fn request_unstake(&self, authority: &Pubkey, shares: u64) -> SdkResult<Instruction> {
        let accounts = vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new(self.depositor(authority)?, false),
            AccountMeta::new_readonly(*authority, true),
        ];
        let data = instruction_data("request_unstake", Some(&SharesArgs { shares }))?;
        Ok(self.build(accounts, data))
    }

    pub fn unstake(&self, authority: &Pubkey) -> SdkResult<Instruction> {
        let data = instruction_data("unstake", None::<&AmountArgs>)?;
        Ok(self.build(self.payout_accounts(authority)?, data))
    }

    pub fn claim_rewards(&self, authority: &Pubkey) -> SdkResult<Instruction> {
        let data = instruction_data("claim_rewards", None::<&AmountArgs>)?;
        Ok(self.build(self.payout_accounts(authority)?, data))
    }

    /// `funder` sends `amount` of the stake mint; the fee share goes to the
    /// platform account.
    pub fn add_rewards(&self, funder: &Pubkey, amount: u64) -> SdkResult<Instruction> {
        let accounts = vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new_readonly(*funder, true),
            AccountMeta::new(self.token_account(funder)?, false),
            AccountMeta::new(self.vault_token_account, false),
            AccountMeta::new(self.platform_account, false),
            AccountMeta::new_readonly(self.ids.token, false),
        ];
        let data = instruction_data("add_rewards", Some(&AmountArgs { amount }))?;
        Ok(self.build(accounts, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{initialize_vault, VaultParams};

    fn builder() -> (VaultInstructions, Vault) {
        let ids = ProgramIds::new(Pubkey::new_unique());
        let vault = initialize_vault(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            VaultParams::default(),
            0,
            255,
        )
        .unwrap();
        (VaultInstructions::new(ids, &vault).unwrap(), vault)
    }

    #[test]
    fn discriminator_is_global_namespace_hash() {
        let expected = Sha256::digest(b"global:stake");
        assert_eq!(instruction_discriminator("stake"), expected[..8]);
        assert_ne!(
            instruction_discriminator("stake"),
            instruction_discriminator("unstake")
        );
    }

    #[test]
    fn stake_encodes_amount_and_pays_from_authority() {
        let (b, vault) = builder();
        let who = Pubkey::new_unique();
        let ix = b.stake(&who, 1_234_567).unwrap();

        assert_eq!(ix.program_id, b.ids.marketplace);
        assert_eq!(ix.data[..8], instruction_discriminator("stake"));
        assert_eq!(ix.data[8..], 1_234_567u64.to_le_bytes());

        let (depositor, _) = vault_depositor_pda(&b.ids.marketplace, &b.vault(), &who).unwrap();
        assert_eq!(ix.accounts[0].pubkey, b.vault());
        assert_eq!(ix.accounts[1].pubkey, depositor);
        assert!(ix.accounts[2].is_signer && ix.accounts[2].is_writable);
        assert_eq!(
            ix.accounts[3].pubkey,
            associated_token_address(&b.ids, &who, &vault.stake_mint).unwrap()
        );
        assert_eq!(ix.accounts[4].pubkey, vault.vault_token_account);
        assert_eq!(ix.accounts[6].pubkey, system_program::id());
    }

    #[test]
    fn argumentless_instructions_carry_only_the_tag() {
        let (b, _) = builder();
        let who = Pubkey::new_unique();
        let unstake = b.unstake(&who).unwrap();
        let claim = b.claim_rewards(&who).unwrap();
        assert_eq!(unstake.data, instruction_discriminator("unstake").to_vec());
        assert_eq!(claim.data, instruction_discriminator("claim_rewards").to_vec());
        assert_eq!(unstake.accounts, claim.accounts);
        assert!(unstake.accounts[2].is_signer && !unstake.accounts[2].is_writable);
    }

    #[test]
    fn request_unstake_and_rewards_layouts() {
        let (b, vault) = builder();
        let who = Pubkey::new_unique();
        let ix = b.request_unstake(&who, 42).unwrap();
        assert_eq!(ix.accounts.len(), 3);
        assert_eq!(ix.data[8..], 42u64.to_le_bytes());

        let ix = b.add_rewards(&who, 9).unwrap();
        assert_eq!(ix.data[..8], instruction_discriminator("add_rewards"));
        assert_eq!(ix.accounts[4].pubkey, vault.platform_account);
        assert!(ix.accounts[4].is_writable);
    }
}
