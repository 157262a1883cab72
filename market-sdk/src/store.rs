//! Working sets over an external account store.
//!
//! Shards, chunks and tree nodes reference each other by address. Mutations load
//! the handful of records they touch into a [`WorkingSet`], change them there and
//! hand back the encoded writes. The set remembers the bytes it first saw so a
//! caller can check nothing moved underneath before submitting.

use std::collections::HashMap;

use solana_sdk::pubkey::Pubkey;

use crate::codec::{decode_account, encode_account, AccountLayout};
use crate::errors::{SdkError, SdkResult};

/// Anything that can hand out raw account bytes by address.
pub trait AccountSource {
    /// `Ok(None)` when the account does not exist.
    fn get_account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>>;
}

impl<S: AccountSource + ?Sized> AccountSource for &S {
    fn get_account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
        (**self).get_account_data(address)
    }
}

/// Encoded account writes in the order they were first made.
pub type AccountWrites = Vec<(Pubkey, Vec<u8>)>;

/// In-process account store. Used by tests and offline tooling.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: HashMap<Pubkey, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn insert_raw(&mut self, address: Pubkey, data: Vec<u8>) {
        self.accounts.insert(address, data);
    }

    pub fn insert<T: AccountLayout>(&mut self, address: Pubkey, value: &T) {
        self.accounts.insert(address, encode_account(value));
    }

    pub fn raw(&self, address: &Pubkey) -> Option<&[u8]> {
        self.accounts.get(address).map(Vec::as_slice)
    }

    pub fn get<T: AccountLayout>(&self, address: &Pubkey) -> SdkResult<Option<T>> {
        self.accounts.get(address).map(|d| decode_account(d)).transpose()
    }

    pub fn apply(&mut self, writes: AccountWrites) {
        for (address, data) in writes {
            self.accounts.insert(address, data);
        }
    }

    /// Run `op` against a fresh working set and commit its writes.
    pub fn transact<T>(
        &mut self,
        op: impl FnMut(&mut WorkingSet<'_, MemoryStore>) -> SdkResult<T>,
    ) -> SdkResult<T> {
        let (value, writes) = run_with_fresh_retry(&*self, op)?;
        self.apply(writes);
        Ok(value)
    }
}

impl AccountSource for MemoryStore {
    fn get_account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
        Ok(self.accounts.get(address).cloned())
    }
}

/// Accounts read and written by one mutation.
pub struct WorkingSet<'a, S: AccountSource + ?Sized> {
    source: &'a S,
    /// Bytes as first read from the source, `None` if the account was absent.
    snapshot: HashMap<Pubkey, Option<Vec<u8>>>,
    current: HashMap<Pubkey, Vec<u8>>,
    write_order: Vec<Pubkey>,
}

impl<'a, S: AccountSource + ?Sized> WorkingSet<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            snapshot: HashMap::new(),
            current: HashMap::new(),
            write_order: Vec::new(),
        }
    }

    fn raw(&mut self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
        if let Some(data) = self.current.get(address) {
            return Ok(Some(data.clone()));
        }
        if let Some(seen) = self.snapshot.get(address) {
            return Ok(seen.clone());
        }
        let fetched = self.source.get_account_data(address)?;
        self.snapshot.insert(*address, fetched.clone());
        Ok(fetched)
    }

    pub fn exists(&mut self, address: &Pubkey) -> SdkResult<bool> {
        Ok(self.raw(address)?.is_some())
    }

    pub fn load<T: AccountLayout>(&mut self, address: &Pubkey) -> SdkResult<Option<T>> {
        self.raw(address)?.map(|d| decode_account(&d)).transpose()
    }

    pub fn require<T: AccountLayout>(&mut self, address: &Pubkey) -> SdkResult<T> {
        self.load(address)?.ok_or(SdkError::AccountNotFound(*address))
    }

    /// Stage `value` at `address`. The prior state is snapshotted first so
    /// [`Self::ensure_fresh`] also covers accounts this mutation creates.
    pub fn store<T: AccountLayout>(&mut self, address: &Pubkey, value: &T) -> SdkResult<()> {
        if !self.snapshot.contains_key(address) && !self.current.contains_key(address) {
            let fetched = self.source.get_account_data(address)?;
            self.snapshot.insert(*address, fetched);
        }
        if self.current.insert(*address, encode_account(value)).is_none() {
            self.write_order.push(*address);
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.write_order.is_empty()
    }

    /// Fails with `StaleAccountState` if any account read or written here has
    /// changed at the source since it was first seen.
    pub fn ensure_fresh(&self) -> SdkResult<()> {
        for (address, seen) in &self.snapshot {
            let now = self.source.get_account_data(address)?;
            if &now != seen {
                return Err(SdkError::StaleAccountState(format!(
                    "account {address} changed since it was read"
                )));
            }
        }
        Ok(())
    }

    pub fn writes(&self) -> Vec<(Pubkey, &[u8])> {
        self.write_order
            .iter()
            .filter_map(|a| self.current.get(a).map(|d| (*a, d.as_slice())))
            .collect()
    }

    pub fn into_writes(mut self) -> AccountWrites {
        self.write_order
            .iter()
            .filter_map(|a| self.current.remove(a).map(|d| (*a, d)))
            .collect()
    }
}

/// Build a mutation against a fresh snapshot, verify the snapshot is still
/// current, and on staleness rebuild it exactly once.
pub fn run_with_fresh_retry<'a, S, T, F>(source: &'a S, mut op: F) -> SdkResult<(T, AccountWrites)>
where
    S: AccountSource + ?Sized,
    F: FnMut(&mut WorkingSet<'a, S>) -> SdkResult<T>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut ws = WorkingSet::new(source);
        let result = op(&mut ws).and_then(|v| ws.ensure_fresh().map(|_| v));
        match result {
            Ok(v) => return Ok((v, ws.into_writes())),
            Err(e) if e.is_retryable() && attempt < 2 => {
                tracing::warn!(error = %e, "stale snapshot, rebuilding mutation once");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::KeywordShard;
    use std::cell::{Cell, RefCell};

    fn shard(idx: u32) -> KeywordShard {
        KeywordShard::empty("hat", idx, Pubkey::default(), 1)
    }

    /// Source where another writer rewrites `target` each time we read it, `races_left` times.
    struct RacingSource {
        accounts: RefCell<HashMap<Pubkey, Vec<u8>>>,
        target: Pubkey,
        races_left: Cell<u32>,
    }

    impl AccountSource for RacingSource {
        fn get_account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
            let out = self.accounts.borrow().get(address).cloned();
            if *address == self.target && self.races_left.get() > 0 {
                let left = self.races_left.get() - 1;
                self.races_left.set(left);
                let mut other = shard(0);
                other.product_ids.push(1_000 + left as u64);
                self.accounts
                    .borrow_mut()
                    .insert(*address, encode_account(&other));
            }
            Ok(out)
        }
    }

    #[test]
    fn reads_see_staged_writes() {
        let store = MemoryStore::new();
        let a = Pubkey::new_unique();
        let mut ws = WorkingSet::new(&store);
        assert!(ws.load::<KeywordShard>(&a).unwrap().is_none());
        ws.store(&a, &shard(3)).unwrap();
        assert_eq!(ws.require::<KeywordShard>(&a).unwrap().shard_index, 3);
        assert!(ws.is_dirty());
        assert_eq!(ws.writes().len(), 1);
    }

    #[test]
    fn require_missing_is_account_not_found() {
        let store = MemoryStore::new();
        let a = Pubkey::new_unique();
        let mut ws = WorkingSet::new(&store);
        assert_eq!(
            ws.require::<KeywordShard>(&a).unwrap_err(),
            SdkError::AccountNotFound(a)
        );
    }

    #[test]
    fn writes_keep_first_write_order() {
        let store = MemoryStore::new();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let mut ws = WorkingSet::new(&store);
        ws.store(&b, &shard(1)).unwrap();
        ws.store(&a, &shard(2)).unwrap();
        ws.store(&b, &shard(3)).unwrap();
        let writes = ws.into_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, b);
        assert_eq!(decode_account::<KeywordShard>(&writes[0].1).unwrap().shard_index, 3);
        assert_eq!(writes[1].0, a);
    }

    #[test]
    fn ensure_fresh_detects_concurrent_change() {
        let target = Pubkey::new_unique();
        let source = RacingSource {
            accounts: RefCell::new(HashMap::from([(target, encode_account(&shard(0)))])),
            target,
            races_left: Cell::new(1),
        };
        let mut ws = WorkingSet::new(&source);
        ws.require::<KeywordShard>(&target).unwrap();
        assert!(matches!(
            ws.ensure_fresh(),
            Err(SdkError::StaleAccountState(_))
        ));
    }

    #[test]
    fn stale_snapshot_is_retried_once() {
        let target = Pubkey::new_unique();
        let source = RacingSource {
            accounts: RefCell::new(HashMap::from([(target, encode_account(&shard(0)))])),
            target,
            races_left: Cell::new(1),
        };
        let mut runs = 0;
        let (len, writes) = run_with_fresh_retry(&source, |ws| {
            runs += 1;
            let mut s: KeywordShard = ws.require(&target)?;
            s.product_ids.push(1);
            ws.store(&target, &s)?;
            Ok(s.product_ids.len())
        })
        .unwrap();
        assert_eq!(runs, 2);
        // second attempt built on top of the other writer's id
        assert_eq!(len, 2);
        assert_eq!(writes.len(), 1);
    }

    #[test]
    fn persistent_staleness_surfaces_after_one_retry() {
        let target = Pubkey::new_unique();
        let source = RacingSource {
            accounts: RefCell::new(HashMap::from([(target, encode_account(&shard(0)))])),
            target,
            races_left: Cell::new(10),
        };
        let err = run_with_fresh_retry(&source, |ws| ws.require::<KeywordShard>(&target))
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn transact_commits_writes() {
        let mut store = MemoryStore::new();
        let a = Pubkey::new_unique();
        store.transact(|ws| ws.store(&a, &shard(7))).unwrap();
        assert_eq!(store.get::<KeywordShard>(&a).unwrap().unwrap().shard_index, 7);
    }
}
