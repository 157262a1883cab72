use solana_sdk::pubkey::Pubkey;

use crate::codec::{AccountLayout, AccountReader, AccountWriter};
use crate::constants::{
    KEYWORD_ROOT_DISCRIMINATOR, KEYWORD_SHARD_DISCRIMINATOR, ROOT_BLOOM_BYTES, SHARD_BLOOM_BYTES,
};
use crate::errors::SdkResult;

/// Head of one keyword's shard chain.
///
/// PDA seeds: `["keyword_root", keyword]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRoot {
    pub keyword: String,
    pub first_shard: Pubkey,
    pub last_shard: Pubkey,
    pub total_shards: u32,
    pub total_products: u32,
    /// Union filter over every product indexed under the keyword.
    pub bloom_filter: [u8; ROOT_BLOOM_BYTES],
    pub bump: u8,
}

impl AccountLayout for KeywordRoot {
    const NAME: &'static str = "KeywordRoot";
    const DISCRIMINATOR: [u8; 8] = KEYWORD_ROOT_DISCRIMINATOR;
    // 8 + 4 (keyword len) + 32 (first_shard) + 32 (last_shard)
    // + 4 (total_shards) + 4 (total_products) + 256 (bloom_filter) + 1 (bump)
    const MIN_LEN: usize = 8 + 4 + 32 + 32 + 4 + 4 + ROOT_BLOOM_BYTES + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            keyword: r.string()?,
            first_shard: r.pubkey()?,
            last_shard: r.pubkey()?,
            total_shards: r.u32()?,
            total_products: r.u32()?,
            bloom_filter: r.array()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.string(&self.keyword);
        w.pubkey(&self.first_shard);
        w.pubkey(&self.last_shard);
        w.u32(self.total_shards);
        w.u32(self.total_products);
        w.put_bytes(&self.bloom_filter);
        w.u8(self.bump);
    }
}

/// One bounded node of a keyword's append chain.
///
/// PDA seeds: `["keyword_shard", keyword, shard_index_le]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordShard {
    pub keyword: String,
    pub shard_index: u32,
    /// Default key for the first shard.
    pub prev_shard: Pubkey,
    pub next_shard: Option<Pubkey>,
    /// Sorted ascending, no duplicates.
    pub product_ids: Vec<u64>,
    pub min_id: u64,
    pub max_id: u64,
    pub bloom_summary: [u8; SHARD_BLOOM_BYTES],
    pub bump: u8,
}

impl KeywordShard {
    pub fn empty(keyword: &str, shard_index: u32, prev_shard: Pubkey, bump: u8) -> Self {
        Self {
            keyword: keyword.to_string(),
            shard_index,
            prev_shard,
            next_shard: None,
            product_ids: Vec::new(),
            min_id: 0,
            max_id: 0,
            bloom_summary: [0u8; SHARD_BLOOM_BYTES],
            bump,
        }
    }

    pub fn is_full(&self, max_products: u16) -> bool {
        self.product_ids.len() >= max_products as usize
    }

    pub fn in_bounds(&self, id: u64) -> bool {
        !self.product_ids.is_empty() && id >= self.min_id && id <= self.max_id
    }

    pub fn refresh_bounds(&mut self) {
        self.min_id = self.product_ids.first().copied().unwrap_or(0);
        self.max_id = self.product_ids.last().copied().unwrap_or(0);
    }
}

impl AccountLayout for KeywordShard {
    const NAME: &'static str = "KeywordShard";
    const DISCRIMINATOR: [u8; 8] = KEYWORD_SHARD_DISCRIMINATOR;
    // 8 + 4 (keyword len) + 4 (shard_index) + 32 (prev_shard) + 1 (next_shard flag)
    // + 4 (product_ids len) + 8 (min_id) + 8 (max_id) + 32 (bloom_summary) + 1 (bump)
    const MIN_LEN: usize = 8 + 4 + 4 + 32 + 1 + 4 + 8 + 8 + SHARD_BLOOM_BYTES + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            keyword: r.string()?,
            shard_index: r.u32()?,
            prev_shard: r.pubkey()?,
            next_shard: r.option(|r| r.pubkey())?,
            product_ids: r.vec(8, |r| r.u64())?,
            min_id: r.u64()?,
            max_id: r.u64()?,
            bloom_summary: r.array()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.string(&self.keyword);
        w.u32(self.shard_index);
        w.pubkey(&self.prev_shard);
        w.option(self.next_shard.as_ref(), |w, k| w.pubkey(k));
        w.vec(&self.product_ids, |w, id| w.u64(*id));
        w.u64(self.min_id);
        w.u64(self.max_id);
        w.put_bytes(&self.bloom_summary);
        w.u8(self.bump);
    }
}
