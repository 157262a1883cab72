//! JSON views of decoded accounts.
//!
//! Pubkeys render as base58, fixed byte arrays as hex, and u128 accumulators
//! as decimal strings so they survive JavaScript consumers.

use market_sdk::bloom;
use market_sdk::state::{
    GlobalIdRoot, IdChunk, KeywordRoot, KeywordShard, MerchantIdAccount, PriceIndexNode,
    ProductSales, RangeEntry, SalesIndexNode, Vault, VaultDepositor,
};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

fn key(k: &Pubkey) -> String {
    k.to_string()
}

fn opt_key(k: &Option<Pubkey>) -> Option<String> {
    k.as_ref().map(key)
}

#[derive(Serialize)]
pub struct GlobalIdRootView {
    pub last_merchant_id: u32,
    pub last_global_id: u64,
    pub chunk_size: u32,
    pub merchants: Vec<String>,
    pub max_products_per_shard: u16,
    pub max_keywords_per_product: u8,
    pub bloom_filter_size: u16,
    pub bump: u8,
}

impl From<&GlobalIdRoot> for GlobalIdRootView {
    fn from(r: &GlobalIdRoot) -> Self {
        Self {
            last_merchant_id: r.last_merchant_id,
            last_global_id: r.last_global_id,
            chunk_size: r.chunk_size,
            merchants: r.merchants.iter().map(key).collect(),
            max_products_per_shard: r.max_products_per_shard,
            max_keywords_per_product: r.max_keywords_per_product,
            bloom_filter_size: r.bloom_filter_size,
            bump: r.bump,
        }
    }
}

#[derive(Serialize)]
pub struct MerchantIdView {
    pub merchant_id: u32,
    pub last_chunk_index: u32,
    pub last_local_id: u64,
    pub active_chunk: String,
    pub unused_chunks: Vec<String>,
    pub bump: u8,
}

impl From<&MerchantIdAccount> for MerchantIdView {
    fn from(m: &MerchantIdAccount) -> Self {
        Self {
            merchant_id: m.merchant_id,
            last_chunk_index: m.last_chunk_index,
            last_local_id: m.last_local_id,
            active_chunk: key(&m.active_chunk),
            unused_chunks: m.unused_chunks.iter().map(key).collect(),
            bump: m.bump,
        }
    }
}

#[derive(Serialize)]
pub struct IdChunkView {
    pub merchant_id: u32,
    pub chunk_index: u32,
    pub start_id: u64,
    pub end_id: u64,
    pub next_available: u64,
    pub used: u64,
    pub capacity: u64,
    pub exhausted: bool,
    pub bump: u8,
}

impl From<&IdChunk> for IdChunkView {
    fn from(c: &IdChunk) -> Self {
        Self {
            merchant_id: c.merchant_id,
            chunk_index: c.chunk_index,
            start_id: c.start_id,
            end_id: c.end_id,
            next_available: c.next_available,
            used: c.used_count(),
            capacity: c.capacity(),
            exhausted: c.is_exhausted(),
            bump: c.bump,
        }
    }
}

#[derive(Serialize)]
pub struct KeywordRootView {
    pub keyword: String,
    pub first_shard: String,
    pub last_shard: String,
    pub total_shards: u32,
    pub total_products: u32,
    pub bloom_fill_ratio: f64,
    pub bump: u8,
}

impl From<&KeywordRoot> for KeywordRootView {
    fn from(r: &KeywordRoot) -> Self {
        Self {
            keyword: r.keyword.clone(),
            first_shard: key(&r.first_shard),
            last_shard: key(&r.last_shard),
            total_shards: r.total_shards,
            total_products: r.total_products,
            bloom_fill_ratio: bloom::fill_ratio(&r.bloom_filter),
            bump: r.bump,
        }
    }
}

#[derive(Serialize)]
pub struct KeywordShardView {
    pub keyword: String,
    pub shard_index: u32,
    pub prev_shard: String,
    pub next_shard: Option<String>,
    pub product_ids: Vec<u64>,
    pub min_id: u64,
    pub max_id: u64,
    pub bloom_summary_hex: String,
    pub bump: u8,
}

impl From<&KeywordShard> for KeywordShardView {
    fn from(s: &KeywordShard) -> Self {
        Self {
            keyword: s.keyword.clone(),
            shard_index: s.shard_index,
            prev_shard: key(&s.prev_shard),
            next_shard: opt_key(&s.next_shard),
            product_ids: s.product_ids.clone(),
            min_id: s.min_id,
            max_id: s.max_id,
            bloom_summary_hex: hex::encode(s.bloom_summary),
            bump: s.bump,
        }
    }
}

#[derive(Serialize)]
pub struct EntryView {
    pub product_id: u64,
    pub value: u64,
}

impl From<&RangeEntry> for EntryView {
    fn from(e: &RangeEntry) -> Self {
        Self {
            product_id: e.product_id,
            value: e.value,
        }
    }
}

#[derive(Serialize)]
pub struct SalesView {
    pub product_id: u64,
    pub merchant: String,
    pub sales: u64,
    pub price: u64,
    pub last_update: i64,
}

impl From<&ProductSales> for SalesView {
    fn from(s: &ProductSales) -> Self {
        Self {
            product_id: s.product_id,
            merchant: key(&s.merchant),
            sales: s.sales,
            price: s.price,
            last_update: s.last_update,
        }
    }
}

#[derive(Serialize)]
pub struct RangeNodeView {
    pub range_start: u64,
    pub range_end: u64,
    pub entries: Vec<EntryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_items: Option<Vec<SalesView>>,
    pub left_child: Option<String>,
    pub right_child: Option<String>,
    pub parent: Option<String>,
    pub height: u8,
    pub bump: u8,
}

impl From<&PriceIndexNode> for RangeNodeView {
    fn from(n: &PriceIndexNode) -> Self {
        Self {
            range_start: n.range_start,
            range_end: n.range_end,
            entries: n.entries.iter().map(EntryView::from).collect(),
            top_items: None,
            left_child: opt_key(&n.left_child),
            right_child: opt_key(&n.right_child),
            parent: opt_key(&n.parent),
            height: n.height,
            bump: n.bump,
        }
    }
}

impl From<&SalesIndexNode> for RangeNodeView {
    fn from(n: &SalesIndexNode) -> Self {
        Self {
            range_start: n.range_start,
            range_end: n.range_end,
            entries: n.entries.iter().map(EntryView::from).collect(),
            top_items: Some(n.top_items.iter().map(SalesView::from).collect()),
            left_child: opt_key(&n.left_child),
            right_child: opt_key(&n.right_child),
            parent: opt_key(&n.parent),
            height: n.height,
            bump: n.bump,
        }
    }
}

#[derive(Serialize)]
pub struct VaultView {
    pub owner: String,
    pub stake_mint: String,
    pub vault_token_account: String,
    pub platform_account: String,
    pub total_shares: u64,
    pub total_assets: u64,
    pub total_rewards: u64,
    pub rewards_per_share: String,
    pub last_rewards_update: i64,
    pub management_fee_bps: u16,
    pub min_stake_amount: u64,
    pub max_total_assets: u64,
    pub unstake_lockup_period: i64,
    pub is_paused: bool,
    pub shares_base: u64,
    pub rebase_version: u32,
    pub owner_shares: u64,
    pub pending_unstake_shares: u64,
    pub reserved_assets: u64,
    pub active_shares: u64,
    pub active_assets: u64,
    pub created_at: i64,
    pub bump: u8,
}

impl From<&Vault> for VaultView {
    fn from(v: &Vault) -> Self {
        Self {
            owner: key(&v.owner),
            stake_mint: key(&v.stake_mint),
            vault_token_account: key(&v.vault_token_account),
            platform_account: key(&v.platform_account),
            total_shares: v.total_shares,
            total_assets: v.total_assets,
            total_rewards: v.total_rewards,
            rewards_per_share: v.rewards_per_share.to_string(),
            last_rewards_update: v.last_rewards_update,
            management_fee_bps: v.management_fee,
            min_stake_amount: v.min_stake_amount,
            max_total_assets: v.max_total_assets,
            unstake_lockup_period: v.unstake_lockup_period,
            is_paused: v.is_paused,
            shares_base: v.shares_base,
            rebase_version: v.rebase_version,
            owner_shares: v.owner_shares,
            pending_unstake_shares: v.pending_unstake_shares,
            reserved_assets: v.reserved_assets,
            active_shares: v.active_shares(),
            active_assets: v.active_assets(),
            created_at: v.created_at,
            bump: v.bump,
        }
    }
}

#[derive(Serialize)]
pub struct UnstakeRequestView {
    pub shares: u64,
    pub request_time: i64,
    pub asset_per_share_at_request: String,
    pub reserved_assets: u64,
}

#[derive(Serialize)]
pub struct DepositorView {
    pub vault: String,
    pub authority: String,
    pub shares: u64,
    pub unlocked_shares: u64,
    pub rewards_debt: String,
    pub unstake_request: Option<UnstakeRequestView>,
    pub total_staked: u64,
    pub total_unstaked: u64,
    pub total_rewards_claimed: u64,
    pub last_stake_time: i64,
    pub last_rewards_claim: i64,
    pub last_rebase_version: u32,
    pub created_at: i64,
    pub bump: u8,
}

impl From<&VaultDepositor> for DepositorView {
    fn from(d: &VaultDepositor) -> Self {
        let req = &d.unstake_request;
        Self {
            vault: key(&d.vault),
            authority: key(&d.authority),
            shares: d.shares,
            unlocked_shares: d.unlocked_shares(),
            rewards_debt: d.rewards_debt.to_string(),
            unstake_request: req.is_pending().then(|| UnstakeRequestView {
                shares: req.shares,
                request_time: req.request_time,
                asset_per_share_at_request: req.asset_per_share_at_request.to_string(),
                reserved_assets: req.reserved_assets,
            }),
            total_staked: d.total_staked,
            total_unstaked: d.total_unstaked,
            total_rewards_claimed: d.total_rewards_claimed,
            last_stake_time: d.last_stake_time,
            last_rewards_claim: d.last_rewards_claim,
            last_rebase_version: d.last_rebase_version,
            created_at: d.created_at,
            bump: d.bump,
        }
    }
}
