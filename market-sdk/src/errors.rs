use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SdkError {
    // ---- Decoding ----
    #[error("wrong account type: expected {expected} discriminator {expected_hex}, found {found_hex}")]
    WrongAccountType {
        expected: &'static str,
        expected_hex: String,
        found_hex: String,
    },
    #[error("truncated data: need {needed} bytes, have {available}")]
    TruncatedData { needed: usize, available: usize },
    #[error("invalid account data: {0}")]
    InvalidData(String),

    // ---- Address derivation ----
    #[error("no off-curve bump found for seeds under program {0}")]
    AddressDerivationExhausted(Pubkey),
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    // ---- Catalog index ----
    #[error("id allocator exhausted: {0}")]
    AllocatorExhausted(String),
    #[error("index capacity exceeded: {0}")]
    IndexCapacityExceeded(String),

    // ---- Vault preconditions ----
    #[error("vault is paused")]
    VaultPaused,
    #[error("stake amount {amount} is below the minimum {minimum}")]
    BelowMinimumStake { amount: u64, minimum: u64 },
    #[error("deposit would raise total assets to {would_be}, above the cap {max}")]
    ExceedsMaxTotalAssets { would_be: u128, max: u64 },
    #[error("requested {requested} shares but only {available} are unlocked")]
    InsufficientUnlockedShares { requested: u64, available: u64 },
    #[error("unstake lockup not elapsed: unlocks at {unlock_at}, now {now}")]
    LockupNotElapsed { unlock_at: i64, now: i64 },
    #[error("no pending unstake request")]
    NoPendingUnstake,
    #[error("an unstake request is already pending")]
    UnstakeAlreadyPending,
    #[error("unstake requested in the same block as the last stake ({0})")]
    StakeTooRecent(i64),
    #[error("no active shares to distribute rewards to")]
    NoActiveShares,

    // ---- Snapshot / gateway ----
    #[error("stale account state: {0}")]
    StaleAccountState(String),
    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),
    #[error("rpc error: {0}")]
    Rpc(String),

    // ---- General ----
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("math overflow")]
    MathOverflow,
}

impl SdkError {
    /// Only a stale snapshot is worth an automatic refetch-and-retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdkError::StaleAccountState(_))
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
