// Program-wide constants. Everything here is part of the wire contract with the
// on-chain program and must not drift.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

// ---------------------------------------------------------------------
// Program ids
// ---------------------------------------------------------------------
pub const SPL_TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const SPL_ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

// ---------------------------------------------------------------------
// PDA seed tags
// ---------------------------------------------------------------------
pub const MERCHANT_INFO_SEED: &[u8] = b"merchant_info";
pub const SYSTEM_CONFIG_SEED: &[u8] = b"system_config";
pub const MERCHANT_ID_SEED: &[u8] = b"merchant_id";
pub const ID_CHUNK_SEED: &[u8] = b"id_chunk";
pub const GLOBAL_ID_ROOT_SEED: &[u8] = b"global_id_root";
pub const KEYWORD_ROOT_SEED: &[u8] = b"keyword_root";
pub const KEYWORD_SHARD_SEED: &[u8] = b"keyword_shard";
pub const PRICE_INDEX_SEED: &[u8] = b"price_index";
pub const SALES_INDEX_SEED: &[u8] = b"sales_index";
pub const DEPOSIT_ESCROW_SEED: &[u8] = b"deposit_escrow";
pub const VAULT_SEED: &[u8] = b"vault";
pub const VAULT_DEPOSITOR_SEED: &[u8] = b"vault_depositor";
pub const VAULT_TOKEN_ACCOUNT_SEED: &[u8] = b"vault_token_account";
pub const GOVERNANCE_CONFIG_SEED: &[u8] = b"governance_config";
pub const PROPOSAL_SEED: &[u8] = b"proposal";

/// Appended to every PDA preimage by the runtime.
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
pub const MAX_SEED_LEN: usize = 32;
pub const MAX_SEEDS: usize = 16;

// ---------------------------------------------------------------------
// Account discriminators: sha256("account:<Name>")[..8]
// ---------------------------------------------------------------------
pub const GLOBAL_ID_ROOT_DISCRIMINATOR: [u8; 8] = [0xa0, 0x34, 0xc1, 0x64, 0xe8, 0xe3, 0x68, 0x59];
pub const MERCHANT_ID_ACCOUNT_DISCRIMINATOR: [u8; 8] =
    [0x65, 0xcd, 0x9a, 0x9f, 0x58, 0x66, 0xd5, 0x52];
pub const ID_CHUNK_DISCRIMINATOR: [u8; 8] = [0xb5, 0x03, 0xbd, 0xf1, 0x82, 0x3a, 0x32, 0x5b];
pub const KEYWORD_ROOT_DISCRIMINATOR: [u8; 8] = [0x25, 0x02, 0x2e, 0xe0, 0x55, 0x63, 0x95, 0xf6];
pub const KEYWORD_SHARD_DISCRIMINATOR: [u8; 8] = [0x41, 0xf0, 0x96, 0x7e, 0xc2, 0x7c, 0x81, 0x7f];
pub const PRICE_INDEX_NODE_DISCRIMINATOR: [u8; 8] =
    [0x8c, 0xe9, 0xec, 0x68, 0x64, 0xa1, 0x06, 0x78];
pub const SALES_INDEX_NODE_DISCRIMINATOR: [u8; 8] =
    [0xb9, 0xb7, 0x2d, 0x5c, 0x48, 0x65, 0x9d, 0xd2];
pub const VAULT_DISCRIMINATOR: [u8; 8] = [0xd3, 0x08, 0xe8, 0x2b, 0x02, 0x98, 0x75, 0x77];
pub const VAULT_DEPOSITOR_DISCRIMINATOR: [u8; 8] = [0x57, 0x6d, 0xb6, 0x6a, 0x57, 0x60, 0x3f, 0xd3];

// ---------------------------------------------------------------------
// ID allocator
// ---------------------------------------------------------------------
pub const DEFAULT_CHUNK_SIZE: u32 = 10_000;
/// Chunks a merchant may retire before the allocator refuses to roll over.
pub const MAX_CHUNKS_PER_MERCHANT: usize = 100;
pub const MAX_MERCHANTS_IN_ROOT: usize = 100;
/// First product id handed out by a fresh global root.
pub const FIRST_GLOBAL_ID: u64 = 1;

// ---------------------------------------------------------------------
// Keyword index
// ---------------------------------------------------------------------
pub const DEFAULT_MAX_PRODUCTS_PER_SHARD: u16 = 100;
pub const DEFAULT_MAX_KEYWORDS_PER_PRODUCT: u8 = 10;
pub const ROOT_BLOOM_BYTES: usize = 256;
pub const SHARD_BLOOM_BYTES: usize = 32;
pub const BLOOM_HASH_COUNT: usize = 3;

// ---------------------------------------------------------------------
// Price / sales range trees
// ---------------------------------------------------------------------
pub const DEFAULT_NODE_CAPACITY: usize = 32;
pub const DEFAULT_TOP_ITEMS: usize = 10;
/// Exclusive upper bound of the indexed value domain.
pub const RANGE_DOMAIN_END: u64 = u64::MAX;

// ---------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------
/// Fixed-point scale of `rewards_per_share` and the unstake snapshot.
pub const PRECISION: u128 = 1_000_000_000_000;
pub const BPS_DENOMINATOR: u64 = 10_000;
/// `rewards_per_share` at or above this value makes a rebase due.
pub const REBASE_THRESHOLD: u128 = 1_000_000_000_000_000_000_000_000_000_000;
pub const DEFAULT_SHARES_BASE: u64 = 1_000;
