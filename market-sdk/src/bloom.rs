//! Fixed-width bloom filters over product ids.
//!
//! `k = 3` probes taken from one sha256 digest of the id's little-endian bytes:
//! probe `i` is digest bytes `[4i, 4i + 4)` read as u32 LE, modulo the bit width.

use sha2::{Digest, Sha256};

use crate::constants::BLOOM_HASH_COUNT;

fn probes(product_id: u64, bit_width: usize) -> [usize; BLOOM_HASH_COUNT] {
    let digest = Sha256::digest(product_id.to_le_bytes());
    let mut out = [0usize; BLOOM_HASH_COUNT];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut word = [0u8; 4];
        word.copy_from_slice(&digest[4 * i..4 * i + 4]);
        *slot = u32::from_le_bytes(word) as usize % bit_width;
    }
    out
}

pub fn insert(filter: &mut [u8], product_id: u64) {
    if filter.is_empty() {
        return;
    }
    for bit in probes(product_id, filter.len() * 8) {
        filter[bit / 8] |= 1 << (bit % 8);
    }
}

/// No false negatives. An empty filter matches nothing.
pub fn may_contain(filter: &[u8], product_id: u64) -> bool {
    if filter.is_empty() {
        return false;
    }
    probes(product_id, filter.len() * 8)
        .iter()
        .all(|bit| filter[bit / 8] & (1 << (bit % 8)) != 0)
}

/// Fraction of set bits, a rough saturation gauge.
pub fn fill_ratio(filter: &[u8]) -> f64 {
    if filter.is_empty() {
        return 0.0;
    }
    let set: u32 = filter.iter().map(|b| b.count_ones()).sum();
    set as f64 / (filter.len() * 8) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ROOT_BLOOM_BYTES, SHARD_BLOOM_BYTES};

    #[test]
    fn inserted_ids_always_match() {
        let mut root = [0u8; ROOT_BLOOM_BYTES];
        let mut shard = [0u8; SHARD_BLOOM_BYTES];
        for id in (1..2_000u64).step_by(7) {
            insert(&mut root, id);
            insert(&mut shard, id);
        }
        for id in (1..2_000u64).step_by(7) {
            assert!(may_contain(&root, id), "root lost {id}");
            assert!(may_contain(&shard, id), "shard lost {id}");
        }
    }

    #[test]
    fn empty_filter_rejects_everything() {
        let root = [0u8; ROOT_BLOOM_BYTES];
        for id in 0..500u64 {
            assert!(!may_contain(&root, id));
        }
        assert!(!may_contain(&[], 1));
    }

    #[test]
    fn sparse_root_filter_rejects_most_absent_ids() {
        let mut root = [0u8; ROOT_BLOOM_BYTES];
        for id in 0..20u64 {
            insert(&mut root, id);
        }
        let false_positives = (10_000..11_000u64).filter(|id| may_contain(&root, *id)).count();
        // 60 of 2048 bits set -> expected rate well under 1%
        assert!(false_positives < 20, "{false_positives} false positives");
    }

    #[test]
    fn each_insert_sets_at_most_k_bits() {
        let mut shard = [0u8; SHARD_BLOOM_BYTES];
        insert(&mut shard, 42);
        let set: u32 = shard.iter().map(|b| b.count_ones()).sum();
        assert!((1..=BLOOM_HASH_COUNT as u32).contains(&set));
        assert!(fill_ratio(&shard) > 0.0);
    }
}
