//! Keyword -> product id index.
//!
//! Each keyword owns a root and an append-only chain of bounded shards. New ids
//! always land in the last shard; once it fills up a fresh shard is linked on.
//! Root and shards carry bloom filters so most negative lookups stop at the root.

use solana_sdk::pubkey::Pubkey;

use crate::bloom;
use crate::constants::{DEFAULT_MAX_PRODUCTS_PER_SHARD, ROOT_BLOOM_BYTES};
use crate::errors::{SdkError, SdkResult};
use crate::pda::{global_id_root_pda, keyword_root_pda, keyword_shard_pda};
use crate::state::{GlobalIdRoot, KeywordRoot, KeywordShard};
use crate::store::{AccountSource, WorkingSet};

fn check_keyword(keyword: &str) -> SdkResult<()> {
    if keyword.is_empty() {
        return Err(SdkError::InvalidArgument("keyword must not be empty".into()));
    }
    Ok(())
}

/// Sizing read from the global root when present.
fn index_limits<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
) -> SdkResult<Option<GlobalIdRoot>> {
    let (root_address, _) = global_id_root_pda(program_id)?;
    ws.load(&root_address)
}

fn max_products_per_shard<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
) -> SdkResult<u16> {
    Ok(index_limits(ws, program_id)?
        .map(|r| r.max_products_per_shard)
        .unwrap_or(DEFAULT_MAX_PRODUCTS_PER_SHARD))
}

/// Pointer walk from the first shard. Stops after `total_shards` hops so a
/// corrupt cycle cannot spin forever.
fn chain_contains<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    root: &KeywordRoot,
    product_id: u64,
) -> SdkResult<bool> {
    let mut next = Some(root.first_shard);
    for _ in 0..root.total_shards {
        let Some(address) = next else { break };
        let shard: KeywordShard = ws.require(&address)?;
        if bloom::may_contain(&shard.bloom_summary, product_id)
            && shard.in_bounds(product_id)
            && shard.product_ids.binary_search(&product_id).is_ok()
        {
            return Ok(true);
        }
        next = shard.next_shard;
    }
    Ok(false)
}

/// Add `product_id` under `keyword`, creating the root and first shard on first
/// use. Returns false if the product was already indexed.
pub fn index_product<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    keyword: &str,
    product_id: u64,
) -> SdkResult<bool> {
    check_keyword(keyword)?;
    let max_products = max_products_per_shard(ws, program_id)?;
    if max_products == 0 {
        return Err(SdkError::IndexCapacityExceeded(
            "max_products_per_shard is zero".into(),
        ));
    }

    let (root_address, root_bump) = keyword_root_pda(program_id, keyword)?;
    let mut root = match ws.load::<KeywordRoot>(&root_address)? {
        Some(root) => root,
        None => {
            let (first, bump) = keyword_shard_pda(program_id, keyword, 0)?;
            ws.store(&first, &KeywordShard::empty(keyword, 0, Pubkey::default(), bump))?;
            tracing::debug!(keyword, root = %root_address, "keyword root created");
            KeywordRoot {
                keyword: keyword.to_string(),
                first_shard: first,
                last_shard: first,
                total_shards: 1,
                total_products: 0,
                bloom_filter: [0u8; ROOT_BLOOM_BYTES],
                bump: root_bump,
            }
        }
    };

    if bloom::may_contain(&root.bloom_filter, product_id) && chain_contains(ws, &root, product_id)? {
        return Ok(false);
    }

    let last_address = root.last_shard;
    let mut shard: KeywordShard = ws.require(&last_address)?;
    if shard.is_full(max_products) {
        return Err(SdkError::IndexCapacityExceeded(format!(
            "last shard {} of '{keyword}' is already full",
            shard.shard_index
        )));
    }
    match shard.product_ids.binary_search(&product_id) {
        Ok(_) => return Ok(false),
        Err(pos) => shard.product_ids.insert(pos, product_id),
    }
    shard.refresh_bounds();
    bloom::insert(&mut shard.bloom_summary, product_id);
    bloom::insert(&mut root.bloom_filter, product_id);
    root.total_products = root
        .total_products
        .checked_add(1)
        .ok_or(SdkError::MathOverflow)?;

    if shard.is_full(max_products) {
        let index = root.total_shards;
        let (address, bump) = keyword_shard_pda(program_id, keyword, index)?;
        let fresh = KeywordShard::empty(keyword, index, last_address, bump);
        shard.next_shard = Some(address);
        root.last_shard = address;
        root.total_shards = index.checked_add(1).ok_or(SdkError::MathOverflow)?;
        ws.store(&address, &fresh)?;
        tracing::debug!(keyword, shard_index = index, shard = %address, "keyword shard allocated");
    }

    ws.store(&last_address, &shard)?;
    ws.store(&root_address, &root)?;
    Ok(true)
}

/// Index one product under several keywords, bounded by the root's
/// `max_keywords_per_product`. Returns how many keywords were newly added.
pub fn index_product_keywords<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    keywords: &[&str],
    product_id: u64,
) -> SdkResult<usize> {
    if let Some(root) = index_limits(ws, program_id)? {
        if keywords.len() > root.max_keywords_per_product as usize {
            return Err(SdkError::InvalidArgument(format!(
                "{} keywords given, at most {} per product",
                keywords.len(),
                root.max_keywords_per_product
            )));
        }
    }
    let mut added = 0;
    for keyword in keywords {
        if index_product(ws, program_id, keyword, product_id)? {
            added += 1;
        }
    }
    Ok(added)
}

/// Root bloom first, then only shards whose summary and id bounds admit the
/// id, then a binary search of those shards. Never a false negative.
pub fn may_contain<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    keyword: &str,
    product_id: u64,
) -> SdkResult<bool> {
    let (root_address, _) = keyword_root_pda(program_id, keyword)?;
    let Some(root) = ws.load::<KeywordRoot>(&root_address)? else {
        return Ok(false);
    };
    if !bloom::may_contain(&root.bloom_filter, product_id) {
        return Ok(false);
    }
    chain_contains(ws, &root, product_id)
}

/// Drop `product_id` from whichever shard holds it. Bloom bits stay set, since
/// other ids may share them.
pub fn remove_product<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    keyword: &str,
    product_id: u64,
) -> SdkResult<bool> {
    let (root_address, _) = keyword_root_pda(program_id, keyword)?;
    let Some(mut root) = ws.load::<KeywordRoot>(&root_address)? else {
        return Ok(false);
    };
    let mut next = Some(root.first_shard);
    for _ in 0..root.total_shards {
        let Some(address) = next else { break };
        let mut shard: KeywordShard = ws.require(&address)?;
        if let Ok(pos) = shard.product_ids.binary_search(&product_id) {
            shard.product_ids.remove(pos);
            shard.refresh_bounds();
            root.total_products = root.total_products.saturating_sub(1);
            ws.store(&address, &shard)?;
            ws.store(&root_address, &root)?;
            return Ok(true);
        }
        next = shard.next_shard;
    }
    Ok(false)
}

/// Page through a keyword's products in shard order. Shards are addressed by
/// index, so a shard that fails to decode is skipped without losing the rest
/// of the chain.
pub fn list_products<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    keyword: &str,
    offset: usize,
    limit: usize,
) -> SdkResult<Vec<u64>> {
    let (root_address, _) = keyword_root_pda(program_id, keyword)?;
    let Some(root) = ws.load::<KeywordRoot>(&root_address)? else {
        return Ok(Vec::new());
    };
    let mut skipped = 0usize;
    let mut out = Vec::new();
    for index in 0..root.total_shards {
        if out.len() >= limit {
            break;
        }
        let (address, _) = keyword_shard_pda(program_id, keyword, index)?;
        let shard = match ws.load::<KeywordShard>(&address) {
            Ok(Some(shard)) => shard,
            Ok(None) => {
                tracing::warn!(keyword, shard_index = index, "keyword shard missing");
                continue;
            }
            Err(e) => {
                tracing::warn!(keyword, shard_index = index, error = %e, "skipping malformed keyword shard");
                continue;
            }
        };
        for id in shard.product_ids {
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if out.len() >= limit {
                break;
            }
            out.push(id);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::id_allocator::{initialize_global_root, RootParams};
    use crate::store::MemoryStore;

    fn setup(max_per_shard: u16) -> (MemoryStore, Pubkey) {
        let pid = Pubkey::new_unique();
        let mut store = MemoryStore::new();
        store
            .transact(|ws| {
                initialize_global_root(
                    ws,
                    &pid,
                    RootParams {
                        max_products_per_shard: max_per_shard,
                        max_keywords_per_product: 3,
                        ..RootParams::default()
                    },
                )
            })
            .unwrap();
        (store, pid)
    }

    fn root(store: &MemoryStore, pid: &Pubkey, keyword: &str) -> KeywordRoot {
        store
            .get(&keyword_root_pda(pid, keyword).unwrap().0)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn indexed_products_are_never_missed() {
        let (mut store, pid) = setup(4);
        let ids: Vec<u64> = (1..=30u64).map(|i| (i * 7_919) % 1_000 + 1).collect();
        for id in &ids {
            assert!(store.transact(|ws| index_product(ws, &pid, "lamp", *id)).unwrap());
        }
        for id in &ids {
            assert!(
                store.transact(|ws| may_contain(ws, &pid, "lamp", *id)).unwrap(),
                "false negative for {id}"
            );
        }
        for absent in 2_000..2_200u64 {
            assert!(!store.transact(|ws| may_contain(ws, &pid, "lamp", absent)).unwrap());
        }
        assert_eq!(root(&store, &pid, "lamp").total_products, 30);
    }

    #[test]
    fn shard_rolls_over_exactly_at_capacity() {
        let (mut store, pid) = setup(4);
        for id in 1..=3u64 {
            store.transact(|ws| index_product(ws, &pid, "desk", id)).unwrap();
        }
        assert_eq!(root(&store, &pid, "desk").total_shards, 1);

        store.transact(|ws| index_product(ws, &pid, "desk", 4)).unwrap();
        let r = root(&store, &pid, "desk");
        assert_eq!(r.total_shards, 2);
        assert_ne!(r.first_shard, r.last_shard);

        let first: KeywordShard = store.get(&r.first_shard).unwrap().unwrap();
        let second: KeywordShard = store.get(&r.last_shard).unwrap().unwrap();
        assert_eq!(first.next_shard, Some(r.last_shard));
        assert_eq!(second.prev_shard, r.first_shard);
        assert_eq!(second.shard_index, 1);
        assert!(second.product_ids.is_empty());
        assert_eq!((first.min_id, first.max_id), (1, 4));

        for id in 5..=7u64 {
            store.transact(|ws| index_product(ws, &pid, "desk", id)).unwrap();
        }
        assert_eq!(root(&store, &pid, "desk").total_shards, 2);
        store.transact(|ws| index_product(ws, &pid, "desk", 8)).unwrap();
        assert_eq!(root(&store, &pid, "desk").total_shards, 3);
    }

    #[test]
    fn shard_ids_stay_sorted() {
        let (mut store, pid) = setup(10);
        for id in [9u64, 3, 7, 1] {
            store.transact(|ws| index_product(ws, &pid, "mug", id)).unwrap();
        }
        let r = root(&store, &pid, "mug");
        let shard: KeywordShard = store.get(&r.first_shard).unwrap().unwrap();
        assert_eq!(shard.product_ids, vec![1, 3, 7, 9]);
        assert_eq!((shard.min_id, shard.max_id), (1, 9));
    }

    #[test]
    fn duplicates_are_ignored_across_shards() {
        let (mut store, pid) = setup(2);
        for id in [1u64, 2, 3] {
            store.transact(|ws| index_product(ws, &pid, "cup", id)).unwrap();
        }
        // 1 lives in the first shard, the last shard holds 3
        assert!(!store.transact(|ws| index_product(ws, &pid, "cup", 1)).unwrap());
        assert!(!store.transact(|ws| index_product(ws, &pid, "cup", 3)).unwrap());
        assert_eq!(root(&store, &pid, "cup").total_products, 3);
    }

    #[test]
    fn removal_keeps_bloom_bits() {
        let (mut store, pid) = setup(4);
        for id in 1..=6u64 {
            store.transact(|ws| index_product(ws, &pid, "pen", id)).unwrap();
        }
        assert!(store.transact(|ws| remove_product(ws, &pid, "pen", 2)).unwrap());
        assert!(!store.transact(|ws| remove_product(ws, &pid, "pen", 2)).unwrap());
        assert!(!store.transact(|ws| may_contain(ws, &pid, "pen", 2)).unwrap());

        let r = root(&store, &pid, "pen");
        assert!(bloom::may_contain(&r.bloom_filter, 2));
        assert_eq!(r.total_products, 5);
        assert!(store.transact(|ws| may_contain(ws, &pid, "pen", 6)).unwrap());
    }

    #[test]
    fn listing_pages_and_skips_malformed_shards() {
        let (mut store, pid) = setup(3);
        for id in 1..=8u64 {
            store.transact(|ws| index_product(ws, &pid, "bag", id)).unwrap();
        }
        let all = store.transact(|ws| list_products(ws, &pid, "bag", 0, 100)).unwrap();
        assert_eq!(all, (1..=8).collect::<Vec<_>>());
        let page = store.transact(|ws| list_products(ws, &pid, "bag", 2, 3)).unwrap();
        assert_eq!(page, vec![3, 4, 5]);

        let (middle, _) = keyword_shard_pda(&pid, "bag", 1).unwrap();
        store.insert_raw(middle, vec![0xde; 40]);
        let rest = store.transact(|ws| list_products(ws, &pid, "bag", 0, 100)).unwrap();
        assert_eq!(rest, vec![1, 2, 3, 7, 8]);

        assert!(store
            .transact(|ws| list_products(ws, &pid, "unknown", 0, 10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn keyword_limits() {
        let (mut store, pid) = setup(4);
        let long = "k".repeat(33);
        assert!(matches!(
            store.transact(|ws| index_product(ws, &pid, &long, 1)),
            Err(SdkError::InvalidSeed(_))
        ));
        assert!(matches!(
            store.transact(|ws| index_product(ws, &pid, "", 1)),
            Err(SdkError::InvalidArgument(_))
        ));
        assert_eq!(
            store
                .transact(|ws| index_product_keywords(ws, &pid, &["a", "b", "a"], 10))
                .unwrap(),
            2
        );
        assert!(matches!(
            store.transact(|ws| index_product_keywords(ws, &pid, &["a", "b", "c", "d"], 11)),
            Err(SdkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn works_without_a_global_root() {
        let pid = Pubkey::new_unique();
        let mut store = MemoryStore::new();
        store.transact(|ws| index_product(ws, &pid, "tea", 5)).unwrap();
        assert!(store.transact(|ws| may_contain(ws, &pid, "tea", 5)).unwrap());
        assert_eq!(root(&store, &pid, "tea").total_shards, 1);
    }
}
