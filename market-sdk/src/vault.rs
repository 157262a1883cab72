//! Staking vault accounting.
//!
//! Ownership is tracked in shares; rewards accrue through a `rewards_per_share`
//! accumulator scaled by `PRECISION`. A depositor is owed
//! `shares * (rewards_per_share - rewards_debt) / PRECISION` for active shares
//! plus, while an unstake request is pending, the requested shares' growth up
//! to the snapshot taken at request time. Pending shares are left out of every
//! later distribution.
//!
//! Shares are minted at the active exchange rate `active_shares / active_assets`,
//! where `active_assets` still includes distributed but unclaimed rewards.
//! Exits are valued on principal only (`active_assets - total_rewards`) so a
//! reward is never paid both through the exit and through the accumulator.
//!
//! Every operation first brings the depositor up to the vault's rebase version.

use solana_sdk::pubkey::Pubkey;

use crate::constants::{BPS_DENOMINATOR, DEFAULT_SHARES_BASE, PRECISION, REBASE_THRESHOLD};
use crate::errors::{SdkError, SdkResult};
use crate::pda::{vault_depositor_pda, vault_pda};
use crate::state::{UnstakeRequest, Vault, VaultDepositor};
use crate::store::{AccountSource, WorkingSet};

fn to_u64(v: u128) -> SdkResult<u64> {
    u64::try_from(v).map_err(|_| SdkError::MathOverflow)
}

fn mul_div(a: u128, b: u128, d: u128) -> SdkResult<u128> {
    if d == 0 {
        return Err(SdkError::MathOverflow);
    }
    Ok(a.checked_mul(b).ok_or(SdkError::MathOverflow)? / d)
}

fn add(a: u64, b: u64) -> SdkResult<u64> {
    a.checked_add(b).ok_or(SdkError::MathOverflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultParams {
    /// Basis points of every reward routed to the platform account.
    pub management_fee: u16,
    pub min_stake_amount: u64,
    pub max_total_assets: u64,
    pub unstake_lockup_period: i64,
    pub shares_base: u64,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            management_fee: 0,
            min_stake_amount: 1,
            max_total_assets: u64::MAX,
            unstake_lockup_period: 7 * 24 * 60 * 60,
            shares_base: DEFAULT_SHARES_BASE,
        }
    }
}

pub fn initialize_vault(
    owner: Pubkey,
    stake_mint: Pubkey,
    vault_token_account: Pubkey,
    platform_account: Pubkey,
    params: VaultParams,
    now: i64,
    bump: u8,
) -> SdkResult<Vault> {
    if params.management_fee as u64 > BPS_DENOMINATOR {
        return Err(SdkError::InvalidArgument(format!(
            "management fee {} bps exceeds {BPS_DENOMINATOR}",
            params.management_fee
        )));
    }
    if params.shares_base < 2 {
        return Err(SdkError::InvalidArgument("shares_base must be at least 2".into()));
    }
    if params.unstake_lockup_period < 0 {
        return Err(SdkError::InvalidArgument("negative unstake lockup".into()));
    }
    Ok(Vault {
        owner,
        stake_mint,
        vault_token_account,
        platform_account,
        total_shares: 0,
        total_assets: 0,
        total_rewards: 0,
        rewards_per_share: 0,
        last_rewards_update: now,
        management_fee: params.management_fee,
        min_stake_amount: params.min_stake_amount,
        max_total_assets: params.max_total_assets,
        unstake_lockup_period: params.unstake_lockup_period,
        is_paused: false,
        shares_base: params.shares_base,
        rebase_version: 0,
        owner_shares: 0,
        pending_unstake_shares: 0,
        reserved_assets: 0,
        created_at: now,
        bump,
    })
}

/// A fresh position, already at the vault's rebase version.
pub fn open_depositor(
    vault: &Vault,
    vault_address: Pubkey,
    authority: Pubkey,
    now: i64,
    bump: u8,
) -> VaultDepositor {
    let mut depositor = VaultDepositor::new(vault_address, authority, now, bump);
    depositor.last_rebase_version = vault.rebase_version;
    depositor
}

pub fn set_paused(vault: &mut Vault, caller: &Pubkey, paused: bool) -> SdkResult<()> {
    if *caller != vault.owner {
        return Err(SdkError::InvalidArgument(format!(
            "{caller} is not the vault owner"
        )));
    }
    vault.is_paused = paused;
    Ok(())
}

// ---------------------------------------------------------------------
// Rebase
// ---------------------------------------------------------------------

pub fn needs_rebase(vault: &Vault) -> bool {
    vault.rewards_per_share >= REBASE_THRESHOLD
}

/// Multiply every share count by `shares_base` and divide the accumulator by
/// it. Depositors catch up lazily through [`sync_depositor`].
pub fn rebase(vault: &mut Vault) -> SdkResult<()> {
    let factor = vault.shares_base;
    if factor < 2 {
        return Err(SdkError::InvalidData(format!("vault shares_base {factor}")));
    }
    vault.total_shares = vault.total_shares.checked_mul(factor).ok_or(SdkError::MathOverflow)?;
    vault.owner_shares = vault.owner_shares.checked_mul(factor).ok_or(SdkError::MathOverflow)?;
    vault.pending_unstake_shares = vault
        .pending_unstake_shares
        .checked_mul(factor)
        .ok_or(SdkError::MathOverflow)?;
    vault.rewards_per_share /= factor as u128;
    vault.rebase_version = vault
        .rebase_version
        .checked_add(1)
        .ok_or(SdkError::MathOverflow)?;
    tracing::debug!(
        rebase_version = vault.rebase_version,
        factor,
        total_shares = vault.total_shares,
        "vault rebased"
    );
    Ok(())
}

/// Apply every rebase the depositor missed. Returns the factor applied; a
/// depositor already at the vault's version is left untouched (factor 1).
pub fn sync_depositor(vault: &Vault, depositor: &mut VaultDepositor) -> SdkResult<u64> {
    if depositor.last_rebase_version > vault.rebase_version {
        return Err(SdkError::InvalidData(format!(
            "depositor rebase version {} is ahead of the vault's {}",
            depositor.last_rebase_version, vault.rebase_version
        )));
    }
    let behind = vault.rebase_version - depositor.last_rebase_version;
    if behind == 0 {
        return Ok(1);
    }
    let factor = vault
        .shares_base
        .checked_pow(behind)
        .ok_or(SdkError::MathOverflow)?;
    depositor.shares = depositor.shares.checked_mul(factor).ok_or(SdkError::MathOverflow)?;
    let request = &mut depositor.unstake_request;
    request.shares = request.shares.checked_mul(factor).ok_or(SdkError::MathOverflow)?;
    request.asset_per_share_at_request /= factor as u128;
    depositor.rewards_debt /= factor as u128;
    depositor.last_rebase_version = vault.rebase_version;
    Ok(factor)
}

// ---------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------

/// Rewards owed to an already-synced depositor.
fn owed(vault: &Vault, depositor: &VaultDepositor) -> SdkResult<u64> {
    let active = depositor.unlocked_shares() as u128;
    let growth = vault.rewards_per_share.saturating_sub(depositor.rewards_debt);
    let mut total = mul_div(active, growth, PRECISION)?;
    let request = &depositor.unstake_request;
    if request.is_pending() {
        let frozen = request
            .asset_per_share_at_request
            .saturating_sub(depositor.rewards_debt);
        total = total
            .checked_add(mul_div(request.shares as u128, frozen, PRECISION)?)
            .ok_or(SdkError::MathOverflow)?;
    }
    to_u64(total)
}

/// Pay out everything owed and move the debt marks up to the present.
fn settle(vault: &mut Vault, depositor: &mut VaultDepositor, now: i64) -> SdkResult<u64> {
    let amount = owed(vault, depositor)?;
    depositor.rewards_debt = vault.rewards_per_share;
    if depositor.unstake_request.is_pending() {
        depositor.unstake_request.asset_per_share_at_request = vault.rewards_per_share;
    }
    if amount > 0 {
        vault.total_rewards = vault.total_rewards.saturating_sub(amount);
        vault.total_assets = vault.total_assets.saturating_sub(amount);
        depositor.total_rewards_claimed = add(depositor.total_rewards_claimed, amount)?;
        depositor.last_rewards_claim = now;
    }
    Ok(amount)
}

/// What [`claim_rewards`] would pay right now. Does not mutate either record.
pub fn pending_rewards(vault: &Vault, depositor: &VaultDepositor) -> SdkResult<u64> {
    let mut synced = depositor.clone();
    sync_depositor(vault, &mut synced)?;
    owed(vault, &synced)
}

/// Pays nothing and changes nothing when nothing is owed.
pub fn claim_rewards(vault: &mut Vault, depositor: &mut VaultDepositor, now: i64) -> SdkResult<u64> {
    sync_depositor(vault, depositor)?;
    if owed(vault, depositor)? == 0 {
        return Ok(0);
    }
    settle(vault, depositor, now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSplit {
    pub platform_fee: u64,
    pub distributed: u64,
    pub rebased: bool,
}

/// Route the management fee to the platform and spread the rest over active
/// shares. Rebases afterwards if the accumulator crossed the threshold.
pub fn add_rewards(vault: &mut Vault, amount: u64, now: i64) -> SdkResult<RewardSplit> {
    if vault.is_paused {
        return Err(SdkError::VaultPaused);
    }
    if amount == 0 {
        return Err(SdkError::InvalidArgument("reward amount is zero".into()));
    }
    let active = vault.active_shares();
    if active == 0 {
        return Err(SdkError::NoActiveShares);
    }
    let fee = to_u64(mul_div(
        amount as u128,
        vault.management_fee as u128,
        BPS_DENOMINATOR as u128,
    )?)?;
    let distributed = amount - fee;
    let increment = mul_div(distributed as u128, PRECISION, active as u128)?;

    vault.rewards_per_share = vault
        .rewards_per_share
        .checked_add(increment)
        .ok_or(SdkError::MathOverflow)?;
    vault.total_rewards = add(vault.total_rewards, distributed)?;
    vault.total_assets = add(vault.total_assets, distributed)?;
    vault.last_rewards_update = now;

    let rebased = needs_rebase(vault);
    if rebased {
        rebase(vault)?;
    }
    Ok(RewardSplit {
        platform_fee: fee,
        distributed,
        rebased,
    })
}

// ---------------------------------------------------------------------
// Stake lifecycle
// ---------------------------------------------------------------------

fn check_deposit(vault: &Vault, amount: u64) -> SdkResult<u64> {
    if vault.is_paused {
        return Err(SdkError::VaultPaused);
    }
    if amount == 0 || amount < vault.min_stake_amount {
        return Err(SdkError::BelowMinimumStake {
            amount,
            minimum: vault.min_stake_amount.max(1),
        });
    }
    let would_be = vault.total_assets as u128 + amount as u128;
    if would_be > vault.max_total_assets as u128 {
        return Err(SdkError::ExceedsMaxTotalAssets {
            would_be,
            max: vault.max_total_assets,
        });
    }
    let active_shares = vault.active_shares();
    let active_assets = vault.active_assets();
    let minted = if active_shares == 0 || active_assets == 0 {
        amount
    } else {
        to_u64(mul_div(
            amount as u128,
            active_shares as u128,
            active_assets as u128,
        )?)?
    };
    if minted == 0 {
        return Err(SdkError::InvalidArgument(format!(
            "deposit of {amount} would mint no shares"
        )));
    }
    Ok(minted)
}

/// Shares a deposit of `amount` would mint against the vault as it stands.
pub fn preview_deposit(vault: &Vault, amount: u64) -> SdkResult<u64> {
    check_deposit(vault, amount)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositOutcome {
    pub shares_minted: u64,
    /// Rewards settled to the depositor before the new shares were added.
    pub rewards_paid: u64,
}

pub fn deposit(
    vault: &mut Vault,
    depositor: &mut VaultDepositor,
    amount: u64,
    now: i64,
) -> SdkResult<DepositOutcome> {
    sync_depositor(vault, depositor)?;
    check_deposit(vault, amount)?;
    let rewards_paid = settle(vault, depositor, now)?;
    let minted = check_deposit(vault, amount)?;

    depositor.shares = add(depositor.shares, minted)?;
    depositor.total_staked = add(depositor.total_staked, amount)?;
    depositor.last_stake_time = now;
    vault.total_shares = add(vault.total_shares, minted)?;
    vault.total_assets = add(vault.total_assets, amount)?;
    if depositor.authority == vault.owner {
        vault.owner_shares = add(vault.owner_shares, minted)?;
    }
    Ok(DepositOutcome {
        shares_minted: minted,
        rewards_paid,
    })
}

/// Principal backing `shares` of the active pool.
pub fn exit_value(vault: &Vault, shares: u64) -> SdkResult<u64> {
    let active_shares = vault.active_shares();
    if active_shares == 0 {
        return Ok(0);
    }
    let principal = vault.active_assets().saturating_sub(vault.total_rewards);
    to_u64(mul_div(
        shares as u128,
        principal as u128,
        active_shares as u128,
    )?)
}

/// Freeze `shares` for exit: they stop earning, their latent rewards are
/// pinned at the current accumulator and their principal moves to the reserve.
/// Returns the reserved amount.
pub fn request_unstake(
    vault: &mut Vault,
    depositor: &mut VaultDepositor,
    shares: u64,
    now: i64,
) -> SdkResult<u64> {
    sync_depositor(vault, depositor)?;
    if shares == 0 {
        return Err(SdkError::InvalidArgument("cannot unstake zero shares".into()));
    }
    if depositor.unstake_request.is_pending() {
        return Err(SdkError::UnstakeAlreadyPending);
    }
    let available = depositor.unlocked_shares();
    if shares > available {
        return Err(SdkError::InsufficientUnlockedShares {
            requested: shares,
            available,
        });
    }
    if now <= depositor.last_stake_time {
        return Err(SdkError::StakeTooRecent(depositor.last_stake_time));
    }

    let reserved = exit_value(vault, shares)?;
    vault.pending_unstake_shares = add(vault.pending_unstake_shares, shares)?;
    vault.reserved_assets = add(vault.reserved_assets, reserved)?;
    depositor.unstake_request = UnstakeRequest {
        shares,
        request_time: now,
        asset_per_share_at_request: vault.rewards_per_share,
        reserved_assets: reserved,
    };
    Ok(reserved)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub shares_burned: u64,
    pub assets: u64,
    /// Rewards the exiting shares earned up to the request.
    pub rewards: u64,
}

pub fn withdraw(
    vault: &mut Vault,
    depositor: &mut VaultDepositor,
    now: i64,
) -> SdkResult<WithdrawOutcome> {
    sync_depositor(vault, depositor)?;
    let request = depositor.unstake_request;
    if !request.is_pending() {
        return Err(SdkError::NoPendingUnstake);
    }
    let unlock_at = request
        .request_time
        .saturating_add(vault.unstake_lockup_period);
    if now < unlock_at {
        return Err(SdkError::LockupNotElapsed { unlock_at, now });
    }

    let frozen = request
        .asset_per_share_at_request
        .saturating_sub(depositor.rewards_debt);
    let rewards = to_u64(mul_div(request.shares as u128, frozen, PRECISION)?)?;

    vault.pending_unstake_shares = vault.pending_unstake_shares.saturating_sub(request.shares);
    vault.reserved_assets = vault.reserved_assets.saturating_sub(request.reserved_assets);
    vault.total_shares = vault.total_shares.saturating_sub(request.shares);
    vault.total_assets = vault
        .total_assets
        .saturating_sub(request.reserved_assets)
        .saturating_sub(rewards);
    vault.total_rewards = vault.total_rewards.saturating_sub(rewards);
    if depositor.authority == vault.owner {
        vault.owner_shares = vault.owner_shares.saturating_sub(request.shares);
    }

    depositor.shares = depositor.shares.saturating_sub(request.shares);
    depositor.unstake_request = UnstakeRequest::default();
    depositor.total_unstaked = add(depositor.total_unstaked, request.reserved_assets)?;
    if rewards > 0 {
        depositor.total_rewards_claimed = add(depositor.total_rewards_claimed, rewards)?;
        depositor.last_rewards_claim = now;
    }
    Ok(WithdrawOutcome {
        shares_burned: request.shares,
        assets: request.reserved_assets,
        rewards,
    })
}

// ---------------------------------------------------------------------
// Working-set helpers
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub vault_address: Pubkey,
    pub vault: Vault,
    pub depositor_address: Pubkey,
    pub depositor: Option<VaultDepositor>,
}

pub fn load_position<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    authority: &Pubkey,
) -> SdkResult<Position> {
    let (vault_address, _) = vault_pda(program_id)?;
    let vault: Vault = ws.require(&vault_address)?;
    let (depositor_address, _) = vault_depositor_pda(program_id, &vault_address, authority)?;
    let depositor = ws.load(&depositor_address)?;
    Ok(Position {
        vault_address,
        vault,
        depositor_address,
        depositor,
    })
}

/// Load the vault and `authority`'s position (opening one if needed), run
/// `op` on them and stage both records.
pub fn with_position<S: AccountSource + ?Sized, T>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    authority: &Pubkey,
    now: i64,
    op: impl FnOnce(&mut Vault, &mut VaultDepositor) -> SdkResult<T>,
) -> SdkResult<T> {
    let (vault_address, _) = vault_pda(program_id)?;
    let mut vault: Vault = ws.require(&vault_address)?;
    let (depositor_address, bump) = vault_depositor_pda(program_id, &vault_address, authority)?;
    let mut depositor = match ws.load::<VaultDepositor>(&depositor_address)? {
        Some(d) => d,
        None => open_depositor(&vault, vault_address, *authority, now, bump),
    };
    let out = op(&mut vault, &mut depositor)?;
    ws.store(&vault_address, &vault)?;
    ws.store(&depositor_address, &depositor)?;
    Ok(out)
}
