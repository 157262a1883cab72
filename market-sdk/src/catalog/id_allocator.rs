//! Two-level product id allocation.
//!
//! The global root hands out whole chunks of id space from a monotonic counter;
//! each merchant then fills its active chunk bit by bit. Ids are unique across
//! merchants because chunks never overlap.

use solana_sdk::pubkey::Pubkey;

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_KEYWORDS_PER_PRODUCT, DEFAULT_MAX_PRODUCTS_PER_SHARD,
    FIRST_GLOBAL_ID, MAX_CHUNKS_PER_MERCHANT, MAX_MERCHANTS_IN_ROOT, ROOT_BLOOM_BYTES,
};
use crate::errors::{SdkError, SdkResult};
use crate::pda::{global_id_root_pda, id_chunk_pda, merchant_id_pda};
use crate::state::{GlobalIdRoot, IdChunk, MerchantIdAccount};
use crate::store::{AccountSource, WorkingSet};

/// Sizing fixed when the global root is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootParams {
    pub chunk_size: u32,
    pub max_products_per_shard: u16,
    pub max_keywords_per_product: u8,
    pub bloom_filter_size: u16,
}

impl Default for RootParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_products_per_shard: DEFAULT_MAX_PRODUCTS_PER_SHARD,
            max_keywords_per_product: DEFAULT_MAX_KEYWORDS_PER_PRODUCT,
            bloom_filter_size: ROOT_BLOOM_BYTES as u16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerchantRegistration {
    pub merchant_id: u32,
    pub merchant_id_account: Pubkey,
    pub first_chunk: Pubkey,
}

pub fn initialize_global_root<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    params: RootParams,
) -> SdkResult<Pubkey> {
    if params.chunk_size == 0 {
        return Err(SdkError::InvalidArgument("chunk_size must be positive".into()));
    }
    if params.max_products_per_shard == 0 {
        return Err(SdkError::InvalidArgument(
            "max_products_per_shard must be positive".into(),
        ));
    }
    let (address, bump) = global_id_root_pda(program_id)?;
    if ws.exists(&address)? {
        return Err(SdkError::InvalidArgument(format!(
            "global id root {address} already exists"
        )));
    }
    let root = GlobalIdRoot {
        last_merchant_id: 0,
        last_global_id: FIRST_GLOBAL_ID,
        chunk_size: params.chunk_size,
        merchants: Vec::new(),
        max_products_per_shard: params.max_products_per_shard,
        max_keywords_per_product: params.max_keywords_per_product,
        bloom_filter_size: params.bloom_filter_size,
        bump,
    };
    ws.store(&address, &root)?;
    Ok(address)
}

/// Carve the next `chunk_size` ids off the global counter.
fn open_chunk(
    program_id: &Pubkey,
    root: &mut GlobalIdRoot,
    merchant_id: u32,
    chunk_index: u32,
) -> SdkResult<(Pubkey, IdChunk)> {
    let start = root.last_global_id;
    let next = start
        .checked_add(root.chunk_size as u64)
        .ok_or_else(|| SdkError::AllocatorExhausted("global id counter overflow".into()))?;
    let (address, bump) = id_chunk_pda(program_id, merchant_id, chunk_index)?;
    root.last_global_id = next;
    Ok((
        address,
        IdChunk::new(merchant_id, chunk_index, start, root.chunk_size, bump),
    ))
}

pub fn register_merchant<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    merchant: &Pubkey,
) -> SdkResult<MerchantRegistration> {
    let (root_address, _) = global_id_root_pda(program_id)?;
    let mut root: GlobalIdRoot = ws.require(&root_address)?;

    let (account_address, bump) = merchant_id_pda(program_id, merchant)?;
    if ws.exists(&account_address)? {
        return Err(SdkError::InvalidArgument(format!(
            "merchant {merchant} is already registered"
        )));
    }
    if root.merchants.len() >= MAX_MERCHANTS_IN_ROOT {
        return Err(SdkError::IndexCapacityExceeded(format!(
            "global merchant registry holds at most {MAX_MERCHANTS_IN_ROOT} merchants"
        )));
    }
    let merchant_id = root
        .last_merchant_id
        .checked_add(1)
        .ok_or_else(|| SdkError::AllocatorExhausted("merchant id space".into()))?;

    let (chunk_address, chunk) = open_chunk(program_id, &mut root, merchant_id, 0)?;
    root.last_merchant_id = merchant_id;
    root.merchants.push(*merchant);

    let account = MerchantIdAccount {
        merchant_id,
        last_chunk_index: 0,
        last_local_id: 0,
        active_chunk: chunk_address,
        unused_chunks: Vec::new(),
        bump,
    };
    ws.store(&root_address, &root)?;
    ws.store(&account_address, &account)?;
    ws.store(&chunk_address, &chunk)?;

    tracing::debug!(%merchant, merchant_id, start_id = chunk.start_id, "merchant registered");
    Ok(MerchantRegistration {
        merchant_id,
        merchant_id_account: account_address,
        first_chunk: chunk_address,
    })
}

/// Hand out the merchant's next free id, rolling over to a fresh chunk when the
/// active one is exhausted.
pub fn allocate_id<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    merchant: &Pubkey,
) -> SdkResult<u64> {
    let (account_address, _) = merchant_id_pda(program_id, merchant)?;
    let mut account: MerchantIdAccount = ws.require(&account_address)?;

    for _ in 0..2 {
        let chunk_address = account.active_chunk;
        let mut chunk: IdChunk = ws.require(&chunk_address)?;

        let free = if chunk.is_exhausted() {
            None
        } else {
            chunk.first_free_from(chunk.next_available)
        };
        if let Some(id) = free {
            chunk.set_used(id, true);
            chunk.next_available = chunk
                .first_free_from(id.saturating_add(1))
                .unwrap_or(chunk.end_id.saturating_add(1));
            account.last_local_id = id;
            ws.store(&chunk_address, &chunk)?;
            ws.store(&account_address, &account)?;
            return Ok(id);
        }

        if account.unused_chunks.len() >= MAX_CHUNKS_PER_MERCHANT {
            return Err(SdkError::AllocatorExhausted(format!(
                "merchant {} already retired {MAX_CHUNKS_PER_MERCHANT} chunks",
                account.merchant_id
            )));
        }
        let (root_address, _) = global_id_root_pda(program_id)?;
        let mut root: GlobalIdRoot = ws.require(&root_address)?;
        let next_index = account
            .last_chunk_index
            .checked_add(1)
            .ok_or_else(|| SdkError::AllocatorExhausted("chunk index space".into()))?;
        let (new_address, new_chunk) =
            open_chunk(program_id, &mut root, account.merchant_id, next_index)?;

        chunk.next_available = chunk.end_id.saturating_add(1);
        account.unused_chunks.push(chunk_address);
        account.active_chunk = new_address;
        account.last_chunk_index = next_index;

        tracing::debug!(
            merchant_id = account.merchant_id,
            retired = %chunk_address,
            chunk_index = next_index,
            start_id = new_chunk.start_id,
            "id chunk rollover"
        );
        ws.store(&chunk_address, &chunk)?;
        ws.store(&root_address, &root)?;
        ws.store(&new_address, &new_chunk)?;
        ws.store(&account_address, &account)?;
    }

    Err(SdkError::AllocatorExhausted(format!(
        "fresh chunk for merchant {} had no free id",
        account.merchant_id
    )))
}

/// Clear `id` in the merchant's active chunk so it can be handed out again.
/// Returns false if the id was not allocated.
pub fn release_id<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    merchant: &Pubkey,
    id: u64,
) -> SdkResult<bool> {
    let (account_address, _) = merchant_id_pda(program_id, merchant)?;
    let account: MerchantIdAccount = ws.require(&account_address)?;
    let mut chunk: IdChunk = ws.require(&account.active_chunk)?;
    if !chunk.contains(id) {
        return Err(SdkError::InvalidArgument(format!(
            "id {id} is outside the active chunk [{}, {}]",
            chunk.start_id, chunk.end_id
        )));
    }
    if !chunk.is_used(id) {
        return Ok(false);
    }
    chunk.set_used(id, false);
    chunk.next_available = chunk.next_available.min(id);
    ws.store(&account.active_chunk, &chunk)?;
    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkUtilization {
    pub chunk_index: u32,
    pub used: u64,
    pub capacity: u64,
    pub retired_chunks: usize,
}

impl ChunkUtilization {
    pub fn rate(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

pub fn chunk_utilization<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    merchant: &Pubkey,
) -> SdkResult<ChunkUtilization> {
    let (account_address, _) = merchant_id_pda(program_id, merchant)?;
    let account: MerchantIdAccount = ws.require(&account_address)?;
    let chunk: IdChunk = ws.require(&account.active_chunk)?;
    Ok(ChunkUtilization {
        chunk_index: chunk.chunk_index,
        used: chunk.used_count(),
        capacity: chunk.capacity(),
        retired_chunks: account.unused_chunks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn setup(chunk_size: u32) -> (MemoryStore, Pubkey) {
        let program_id = Pubkey::new_unique();
        let mut store = MemoryStore::new();
        store
            .transact(|ws| {
                initialize_global_root(
                    ws,
                    &program_id,
                    RootParams {
                        chunk_size,
                        ..RootParams::default()
                    },
                )
            })
            .unwrap();
        (store, program_id)
    }

    fn merchant_account(store: &MemoryStore, pid: &Pubkey, merchant: &Pubkey) -> MerchantIdAccount {
        let (addr, _) = merchant_id_pda(pid, merchant).unwrap();
        store.get(&addr).unwrap().unwrap()
    }

    #[test]
    fn fifth_id_rolls_over_a_four_id_chunk() {
        let (mut store, pid) = setup(4);
        let merchant = Pubkey::new_unique();
        let reg = store.transact(|ws| register_merchant(ws, &pid, &merchant)).unwrap();
        assert_eq!(reg.merchant_id, 1);

        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap());
        }
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(merchant_account(&store, &pid, &merchant).last_chunk_index, 0);

        let fifth = store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap();
        assert_eq!(fifth, 5);

        let account = merchant_account(&store, &pid, &merchant);
        assert_eq!(account.last_chunk_index, 1);
        assert_eq!(account.unused_chunks, vec![reg.first_chunk]);
        assert_eq!(account.last_local_id, 5);

        let old: IdChunk = store.get(&reg.first_chunk).unwrap().unwrap();
        assert_eq!(old.used_count(), 4);
        assert_eq!(old.bitmap[0] & 0x0f, 0x0f);
        assert!(old.is_exhausted());

        let (root_addr, _) = global_id_root_pda(&pid).unwrap();
        let root: GlobalIdRoot = store.get(&root_addr).unwrap().unwrap();
        assert_eq!(root.last_global_id, 9);
    }

    #[test]
    fn ids_are_unique_across_interleaved_merchants() {
        let (mut store, pid) = setup(3);
        let merchants: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        for m in &merchants {
            store.transact(|ws| register_merchant(ws, &pid, m)).unwrap();
        }
        let mut seen = HashSet::new();
        let mut last_per_merchant = vec![0u64; merchants.len()];
        for round in 0..10 {
            for (i, m) in merchants.iter().enumerate() {
                let id = store.transact(|ws| allocate_id(ws, &pid, m)).unwrap();
                assert!(seen.insert(id), "id {id} handed out twice (round {round})");
                assert!(id > last_per_merchant[i]);
                last_per_merchant[i] = id;
            }
        }
        assert_eq!(seen.len(), 30);
    }

    #[test]
    fn released_id_is_reused_first() {
        let (mut store, pid) = setup(8);
        let merchant = Pubkey::new_unique();
        store.transact(|ws| register_merchant(ws, &pid, &merchant)).unwrap();
        for _ in 0..4 {
            store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap();
        }
        assert!(store.transact(|ws| release_id(ws, &pid, &merchant, 2)).unwrap());
        assert!(!store.transact(|ws| release_id(ws, &pid, &merchant, 2)).unwrap());
        assert_eq!(store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap(), 2);
        assert_eq!(store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap(), 5);

        let util = store.transact(|ws| chunk_utilization(ws, &pid, &merchant)).unwrap();
        assert_eq!(util.used, 5);
        assert_eq!(util.capacity, 8);
        assert!((util.rate() - 0.625).abs() < 1e-9);

        assert!(matches!(
            store.transact(|ws| release_id(ws, &pid, &merchant, 100)),
            Err(SdkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn merchant_chunk_budget_is_enforced() {
        let (mut store, pid) = setup(1);
        let merchant = Pubkey::new_unique();
        store.transact(|ws| register_merchant(ws, &pid, &merchant)).unwrap();
        for _ in 0..=MAX_CHUNKS_PER_MERCHANT {
            store.transact(|ws| allocate_id(ws, &pid, &merchant)).unwrap();
        }
        assert!(matches!(
            store.transact(|ws| allocate_id(ws, &pid, &merchant)),
            Err(SdkError::AllocatorExhausted(_))
        ));
    }

    #[test]
    fn global_counter_overflow_is_allocator_exhausted() {
        let (mut store, pid) = setup(10);
        let (root_addr, _) = global_id_root_pda(&pid).unwrap();
        let mut root: GlobalIdRoot = store.get(&root_addr).unwrap().unwrap();
        root.last_global_id = u64::MAX - 5;
        store.insert(root_addr, &root);

        let merchant = Pubkey::new_unique();
        let err = store
            .transact(|ws| register_merchant(ws, &pid, &merchant))
            .unwrap_err();
        assert!(matches!(err, SdkError::AllocatorExhausted(_)));
        // nothing committed
        assert!(store
            .get::<MerchantIdAccount>(&merchant_id_pda(&pid, &merchant).unwrap().0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn double_registration_and_double_init_are_rejected() {
        let (mut store, pid) = setup(4);
        let merchant = Pubkey::new_unique();
        store.transact(|ws| register_merchant(ws, &pid, &merchant)).unwrap();
        assert!(matches!(
            store.transact(|ws| register_merchant(ws, &pid, &merchant)),
            Err(SdkError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.transact(|ws| initialize_global_root(ws, &pid, RootParams::default())),
            Err(SdkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn allocation_without_registration_is_account_not_found() {
        let (mut store, pid) = setup(4);
        let merchant = Pubkey::new_unique();
        assert!(matches!(
            store.transact(|ws| allocate_id(ws, &pid, &merchant)),
            Err(SdkError::AccountNotFound(_))
        ));
    }
}
