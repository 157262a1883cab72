use solana_sdk::pubkey::Pubkey;

use crate::codec::{AccountLayout, AccountReader, AccountWriter};
use crate::constants::{
    GLOBAL_ID_ROOT_DISCRIMINATOR, ID_CHUNK_DISCRIMINATOR, MERCHANT_ID_ACCOUNT_DISCRIMINATOR,
};
use crate::errors::SdkResult;

/// Process-wide id counters and index sizing constants.
///
/// PDA seeds: `["global_id_root"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalIdRoot {
    pub last_merchant_id: u32,
    /// Next id to hand out as the start of a fresh chunk. Only ever grows.
    pub last_global_id: u64,
    /// Fixed at creation.
    pub chunk_size: u32,
    pub merchants: Vec<Pubkey>,
    pub max_products_per_shard: u16,
    pub max_keywords_per_product: u8,
    pub bloom_filter_size: u16,
    pub bump: u8,
}

impl AccountLayout for GlobalIdRoot {
    const NAME: &'static str = "GlobalIdRoot";
    const DISCRIMINATOR: [u8; 8] = GLOBAL_ID_ROOT_DISCRIMINATOR;
    // 8 (discriminator)
    // + 4 (last_merchant_id) + 8 (last_global_id) + 4 (chunk_size)
    // + 4 (merchants len)
    // + 2 (max_products_per_shard) + 1 (max_keywords_per_product) + 2 (bloom_filter_size)
    // + 1 (bump)
    const MIN_LEN: usize = 8 + 4 + 8 + 4 + 4 + 2 + 1 + 2 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            last_merchant_id: r.u32()?,
            last_global_id: r.u64()?,
            chunk_size: r.u32()?,
            merchants: r.vec(32, |r| r.pubkey())?,
            max_products_per_shard: r.u16()?,
            max_keywords_per_product: r.u8()?,
            bloom_filter_size: r.u16()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.u32(self.last_merchant_id);
        w.u64(self.last_global_id);
        w.u32(self.chunk_size);
        w.vec(&self.merchants, |w, k| w.pubkey(k));
        w.u16(self.max_products_per_shard);
        w.u8(self.max_keywords_per_product);
        w.u16(self.bloom_filter_size);
        w.u8(self.bump);
    }
}

/// Per-merchant cursor into id space.
///
/// PDA seeds: `["merchant_id", merchant]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantIdAccount {
    pub merchant_id: u32,
    pub last_chunk_index: u32,
    pub last_local_id: u64,
    pub active_chunk: Pubkey,
    /// Retired (exhausted) chunks, oldest first.
    pub unused_chunks: Vec<Pubkey>,
    pub bump: u8,
}

impl AccountLayout for MerchantIdAccount {
    const NAME: &'static str = "MerchantIdAccount";
    const DISCRIMINATOR: [u8; 8] = MERCHANT_ID_ACCOUNT_DISCRIMINATOR;
    // 8 + 4 (merchant_id) + 4 (last_chunk_index) + 8 (last_local_id)
    // + 32 (active_chunk) + 4 (unused_chunks len) + 1 (bump)
    const MIN_LEN: usize = 8 + 4 + 4 + 8 + 32 + 4 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            merchant_id: r.u32()?,
            last_chunk_index: r.u32()?,
            last_local_id: r.u64()?,
            active_chunk: r.pubkey()?,
            unused_chunks: r.vec(32, |r| r.pubkey())?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.u32(self.merchant_id);
        w.u32(self.last_chunk_index);
        w.u64(self.last_local_id);
        w.pubkey(&self.active_chunk);
        w.vec(&self.unused_chunks, |w, k| w.pubkey(k));
        w.u8(self.bump);
    }
}

/// A merchant-owned id range `[start_id, end_id]` with an allocation bitmap.
///
/// PDA seeds: `["id_chunk", merchant_id_le, chunk_index_le]`
///
/// Bit numbering: id `start_id + i` -> byte `i / 8`, mask `1 << (i % 8)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdChunk {
    pub merchant_id: u32,
    pub chunk_index: u32,
    pub start_id: u64,
    pub end_id: u64,
    /// Absolute id of the next free slot, or `end_id + 1` once exhausted.
    pub next_available: u64,
    pub bitmap: Vec<u8>,
    pub bump: u8,
}

impl IdChunk {
    pub fn new(merchant_id: u32, chunk_index: u32, start_id: u64, size: u32, bump: u8) -> Self {
        let size = size.max(1) as u64;
        Self {
            merchant_id,
            chunk_index,
            start_id,
            end_id: start_id + size - 1,
            next_available: start_id,
            bitmap: vec![0u8; size.div_ceil(8) as usize],
            bump,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.end_id - self.start_id + 1
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.start_id && id <= self.end_id
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_available > self.end_id
    }

    pub fn is_used(&self, id: u64) -> bool {
        if !self.contains(id) {
            return false;
        }
        let off = id - self.start_id;
        self.bitmap
            .get((off / 8) as usize)
            .is_some_and(|b| (b >> (off % 8)) & 1 == 1)
    }

    pub fn set_used(&mut self, id: u64, used: bool) {
        if !self.contains(id) {
            return;
        }
        let off = id - self.start_id;
        if let Some(b) = self.bitmap.get_mut((off / 8) as usize) {
            let mask = 1u8 << (off % 8);
            if used {
                *b |= mask;
            } else {
                *b &= !mask;
            }
        }
    }

    /// First clear id at or after `from`, if any.
    pub fn first_free_from(&self, from: u64) -> Option<u64> {
        (from.max(self.start_id)..=self.end_id).find(|id| !self.is_used(*id))
    }

    pub fn used_count(&self) -> u64 {
        self.bitmap.iter().map(|b| b.count_ones() as u64).sum()
    }
}

impl AccountLayout for IdChunk {
    const NAME: &'static str = "IdChunk";
    const DISCRIMINATOR: [u8; 8] = ID_CHUNK_DISCRIMINATOR;
    // 8 + 4 (merchant_id) + 4 (chunk_index) + 8 (start_id) + 8 (end_id)
    // + 8 (next_available) + 4 (bitmap len) + 1 (bump)
    const MIN_LEN: usize = 8 + 4 + 4 + 8 + 8 + 8 + 4 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            merchant_id: r.u32()?,
            chunk_index: r.u32()?,
            start_id: r.u64()?,
            end_id: r.u64()?,
            next_available: r.u64()?,
            bitmap: r.bytes()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.u32(self.merchant_id);
        w.u32(self.chunk_index);
        w.u64(self.start_id);
        w.u64(self.end_id);
        w.u64(self.next_available);
        w.bytes(&self.bitmap);
        w.u8(self.bump);
    }
}
