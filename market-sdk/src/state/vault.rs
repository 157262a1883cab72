use solana_sdk::pubkey::Pubkey;

use crate::codec::{AccountLayout, AccountReader, AccountWriter};
use crate::constants::{VAULT_DEPOSITOR_DISCRIMINATOR, VAULT_DISCRIMINATOR};
use crate::errors::SdkResult;

/// The staking pool.
///
/// PDA seeds: `["vault"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub owner: Pubkey,
    pub stake_mint: Pubkey,
    pub vault_token_account: Pubkey,
    /// Receives the management fee cut of every reward.
    pub platform_account: Pubkey,
    pub total_shares: u64,
    pub total_assets: u64,
    /// Distributed but not yet claimed.
    pub total_rewards: u64,
    /// Accumulator scaled by `PRECISION`.
    pub rewards_per_share: u128,
    pub last_rewards_update: i64,
    /// Basis points.
    pub management_fee: u16,
    pub min_stake_amount: u64,
    pub max_total_assets: u64,
    pub unstake_lockup_period: i64,
    pub is_paused: bool,
    /// Per-rebase share multiplier, fixed at creation.
    pub shares_base: u64,
    pub rebase_version: u32,
    pub owner_shares: u64,
    pub pending_unstake_shares: u64,
    pub reserved_assets: u64,
    pub created_at: i64,
    pub bump: u8,
}

impl Vault {
    /// Shares still participating in reward distribution.
    pub fn active_shares(&self) -> u64 {
        self.total_shares.saturating_sub(self.pending_unstake_shares)
    }

    /// Assets backing the active shares.
    pub fn active_assets(&self) -> u64 {
        self.total_assets.saturating_sub(self.reserved_assets)
    }
}

impl AccountLayout for Vault {
    const NAME: &'static str = "Vault";
    const DISCRIMINATOR: [u8; 8] = VAULT_DISCRIMINATOR;
    // 8 (Discriminator)
    // + 32 (owner) + 32 (stake_mint) + 32 (vault_token_account) + 32 (platform_account)
    // + 8 (total_shares) + 8 (total_assets) + 8 (total_rewards)
    // + 16 (rewards_per_share) + 8 (last_rewards_update)
    // + 2 (management_fee) + 8 (min_stake_amount) + 8 (max_total_assets)
    // + 8 (unstake_lockup_period) + 1 (is_paused)
    // + 8 (shares_base) + 4 (rebase_version)
    // + 8 (owner_shares) + 8 (pending_unstake_shares) + 8 (reserved_assets)
    // + 8 (created_at) + 1 (bump)
    const MIN_LEN: usize = 8
        + 32 + 32 + 32 + 32
        + 8 + 8 + 8
        + 16 + 8
        + 2 + 8 + 8
        + 8 + 1
        + 8 + 4
        + 8 + 8 + 8
        + 8 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            owner: r.pubkey()?,
            stake_mint: r.pubkey()?,
            vault_token_account: r.pubkey()?,
            platform_account: r.pubkey()?,
            total_shares: r.u64()?,
            total_assets: r.u64()?,
            total_rewards: r.u64()?,
            rewards_per_share: r.u128()?,
            last_rewards_update: r.i64()?,
            management_fee: r.u16()?,
            min_stake_amount: r.u64()?,
            max_total_assets: r.u64()?,
            unstake_lockup_period: r.i64()?,
            is_paused: r.bool()?,
            shares_base: r.u64()?,
            rebase_version: r.u32()?,
            owner_shares: r.u64()?,
            pending_unstake_shares: r.u64()?,
            reserved_assets: r.u64()?,
            created_at: r.i64()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.pubkey(&self.owner);
        w.pubkey(&self.stake_mint);
        w.pubkey(&self.vault_token_account);
        w.pubkey(&self.platform_account);
        w.u64(self.total_shares);
        w.u64(self.total_assets);
        w.u64(self.total_rewards);
        w.u128(self.rewards_per_share);
        w.i64(self.last_rewards_update);
        w.u16(self.management_fee);
        w.u64(self.min_stake_amount);
        w.u64(self.max_total_assets);
        w.i64(self.unstake_lockup_period);
        w.bool(self.is_paused);
        w.u64(self.shares_base);
        w.u32(self.rebase_version);
        w.u64(self.owner_shares);
        w.u64(self.pending_unstake_shares);
        w.u64(self.reserved_assets);
        w.i64(self.created_at);
        w.u8(self.bump);
    }
}

/// A pending exit. All-zero means no request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnstakeRequest {
    pub shares: u64,
    pub request_time: i64,
    /// `rewards_per_share` frozen at request time.
    pub asset_per_share_at_request: u128,
    /// Assets moved into the vault's reserve for this request.
    pub reserved_assets: u64,
}

impl UnstakeRequest {
    pub const SIZE: usize = 8 + 8 + 16 + 8;

    pub fn is_pending(&self) -> bool {
        self.shares > 0
    }
}

/// One staking wallet's position.
///
/// PDA seeds: `["vault_depositor", vault, depositor]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultDepositor {
    pub vault: Pubkey,
    pub authority: Pubkey,
    pub shares: u64,
    pub rewards_debt: u128,
    pub unstake_request: UnstakeRequest,
    pub total_staked: u64,
    pub total_unstaked: u64,
    pub total_rewards_claimed: u64,
    pub last_stake_time: i64,
    pub last_rewards_claim: i64,
    pub last_rebase_version: u32,
    pub created_at: i64,
    pub bump: u8,
}

impl VaultDepositor {
    pub fn new(vault: Pubkey, authority: Pubkey, now: i64, bump: u8) -> Self {
        Self {
            vault,
            authority,
            shares: 0,
            rewards_debt: 0,
            unstake_request: UnstakeRequest::default(),
            total_staked: 0,
            total_unstaked: 0,
            total_rewards_claimed: 0,
            last_stake_time: 0,
            last_rewards_claim: 0,
            last_rebase_version: 0,
            created_at: now,
            bump,
        }
    }

    pub fn unlocked_shares(&self) -> u64 {
        self.shares.saturating_sub(self.unstake_request.shares)
    }
}

impl AccountLayout for VaultDepositor {
    const NAME: &'static str = "VaultDepositor";
    const DISCRIMINATOR: [u8; 8] = VAULT_DEPOSITOR_DISCRIMINATOR;
    // 8 + 32 (vault) + 32 (authority) + 8 (shares) + 16 (rewards_debt)
    // + 40 (unstake_request)
    // + 8 (total_staked) + 8 (total_unstaked) + 8 (total_rewards_claimed)
    // + 8 (last_stake_time) + 8 (last_rewards_claim) + 4 (last_rebase_version)
    // + 8 (created_at) + 1 (bump)
    const MIN_LEN: usize = 8 + 32 + 32 + 8 + 16
        + UnstakeRequest::SIZE
        + 8 + 8 + 8
        + 8 + 8 + 4
        + 8 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            vault: r.pubkey()?,
            authority: r.pubkey()?,
            shares: r.u64()?,
            rewards_debt: r.u128()?,
            unstake_request: UnstakeRequest {
                shares: r.u64()?,
                request_time: r.i64()?,
                asset_per_share_at_request: r.u128()?,
                reserved_assets: r.u64()?,
            },
            total_staked: r.u64()?,
            total_unstaked: r.u64()?,
            total_rewards_claimed: r.u64()?,
            last_stake_time: r.i64()?,
            last_rewards_claim: r.i64()?,
            last_rebase_version: r.u32()?,
            created_at: r.i64()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.pubkey(&self.vault);
        w.pubkey(&self.authority);
        w.u64(self.shares);
        w.u128(self.rewards_debt);
        w.u64(self.unstake_request.shares);
        w.i64(self.unstake_request.request_time);
        w.u128(self.unstake_request.asset_per_share_at_request);
        w.u64(self.unstake_request.reserved_assets);
        w.u64(self.total_staked);
        w.u64(self.total_unstaked);
        w.u64(self.total_rewards_claimed);
        w.i64(self.last_stake_time);
        w.i64(self.last_rewards_claim);
        w.u32(self.last_rebase_version);
        w.i64(self.created_at);
        w.u8(self.bump);
    }
}
