//! Gateway to a Solana RPC node.
//!
//! The gateway only moves bytes: it fetches raw account data and forwards
//! signed transactions. Decoding goes through [`crate::codec`] and retries are
//! left to the caller.

use solana_client::rpc_client::RpcClient;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;

use crate::codec::{decode_account, AccountLayout};
use crate::errors::{SdkError, SdkResult};
use crate::store::AccountSource;

/// `getMultipleAccounts` accepts at most this many keys per call.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

pub trait RpcGateway {
    /// `Ok(None)` when the account does not exist.
    fn get_account(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>>;

    /// One entry per address, in order. Callers keep batches within
    /// [`MAX_MULTIPLE_ACCOUNTS`].
    fn get_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Vec<u8>>>> {
        addresses.iter().map(|a| self.get_account(a)).collect()
    }

    fn latest_blockhash(&self) -> SdkResult<Hash>;

    fn submit_transaction(&self, tx: &Transaction) -> SdkResult<Signature>;
}

impl RpcGateway for RpcClient {
    fn get_account(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
        let resp = self
            .get_account_with_commitment(address, self.commitment())
            .map_err(|e| SdkError::Rpc(format!("fetch account {address} failed: {e}")))?;
        Ok(resp.value.map(|acc| acc.data))
    }

    fn get_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Vec<u8>>>> {
        let accs = self
            .get_multiple_accounts(addresses)
            .map_err(|e| SdkError::Rpc(format!("fetch multiple accounts failed: {e}")))?;
        Ok(accs.into_iter().map(|acc| acc.map(|a| a.data)).collect())
    }

    fn latest_blockhash(&self) -> SdkResult<Hash> {
        self.get_latest_blockhash()
            .map_err(|e| SdkError::Rpc(format!("blockhash failed: {e}")))
    }

    fn submit_transaction(&self, tx: &Transaction) -> SdkResult<Signature> {
        self.send_transaction(tx)
            .map_err(|e| SdkError::Rpc(format!("send tx failed: {e}")))
    }
}

/// Adapts a gateway to the account-source contract used by working sets.
pub struct RpcSource<G> {
    gateway: G,
}

impl<G: RpcGateway> RpcSource<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

impl<G: RpcGateway> AccountSource for RpcSource<G> {
    fn get_account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
        self.gateway.get_account(address)
    }
}

pub fn fetch_account<T: AccountLayout>(
    gateway: &impl RpcGateway,
    address: &Pubkey,
) -> SdkResult<Option<T>> {
    gateway
        .get_account(address)?
        .map(|data| decode_account::<T>(&data))
        .transpose()
}

/// Batched fetch. A transport failure fails the whole call; a record that does
/// not decode only fails its own slot.
pub fn fetch_accounts<T: AccountLayout>(
    gateway: &impl RpcGateway,
    addresses: &[Pubkey],
) -> SdkResult<Vec<SdkResult<Option<T>>>> {
    let mut out = Vec::with_capacity(addresses.len());
    for batch in addresses.chunks(MAX_MULTIPLE_ACCOUNTS) {
        let accs = gateway.get_accounts(batch)?;
        if accs.len() != batch.len() {
            return Err(SdkError::Rpc(format!(
                "asked for {} accounts, got {}",
                batch.len(),
                accs.len()
            )));
        }
        for (address, acc) in batch.iter().zip(accs) {
            let item = acc.map(|data| decode_account::<T>(&data)).transpose();
            if let Err(e) = &item {
                tracing::debug!(%address, error = %e, "account failed to decode");
            }
            out.push(item);
        }
    }
    Ok(out)
}

/// Sign `instructions` with `payer` against a fresh blockhash and submit.
/// Returns as soon as the node accepts the transaction; confirmation is the
/// caller's concern.
pub fn sign_and_submit(
    gateway: &impl RpcGateway,
    instructions: &[Instruction],
    payer: &Keypair,
) -> SdkResult<Signature> {
    let blockhash = gateway.latest_blockhash()?;
    let mut tx = Transaction::new_unsigned(Message::new(instructions, Some(&payer.pubkey())));
    tx.try_sign(&[payer], blockhash)
        .map_err(|e| SdkError::Rpc(format!("sign tx failed: {e}")))?;
    gateway.submit_transaction(&tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_account;
    use crate::state::{KeywordShard, Vault};
    use crate::store::WorkingSet;
    use solana_sdk::instruction::AccountMeta;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockGateway {
        accounts: HashMap<Pubkey, Vec<u8>>,
        batch_calls: Cell<usize>,
        submitted: RefCell<Vec<Transaction>>,
        down: bool,
    }

    impl RpcGateway for MockGateway {
        fn get_account(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
            if self.down {
                return Err(SdkError::Rpc("connection refused".into()));
            }
            Ok(self.accounts.get(address).cloned())
        }

        fn get_accounts(&self, addresses: &[Pubkey]) -> SdkResult<Vec<Option<Vec<u8>>>> {
            assert!(addresses.len() <= MAX_MULTIPLE_ACCOUNTS);
            self.batch_calls.set(self.batch_calls.get() + 1);
            addresses.iter().map(|a| self.get_account(a)).collect()
        }

        fn latest_blockhash(&self) -> SdkResult<Hash> {
            Ok(Hash::new_unique())
        }

        fn submit_transaction(&self, tx: &Transaction) -> SdkResult<Signature> {
            self.submitted.borrow_mut().push(tx.clone());
            Ok(tx.signatures[0])
        }
    }

    fn shard(index: u32) -> KeywordShard {
        let mut s = KeywordShard::empty("lamp", index, Pubkey::default(), 1);
        s.product_ids = vec![u64::from(index) + 1];
        s.refresh_bounds();
        s
    }

    #[test]
    fn single_fetch_decodes_or_reports_absence() {
        let mut gw = MockGateway::default();
        let addr = Pubkey::new_unique();
        gw.accounts.insert(addr, encode_account(&shard(3)));

        let got: KeywordShard = fetch_account(&gw, &addr).unwrap().unwrap();
        assert_eq!(got.shard_index, 3);
        assert!(fetch_account::<KeywordShard>(&gw, &Pubkey::new_unique())
            .unwrap()
            .is_none());
        assert!(matches!(
            fetch_account::<Vault>(&gw, &addr),
            Err(SdkError::WrongAccountType { .. })
        ));
    }

    #[test]
    fn batched_fetch_isolates_bad_records() {
        let mut gw = MockGateway::default();
        let mut addresses = Vec::new();
        for i in 0..150u32 {
            let addr = Pubkey::new_unique();
            if i % 50 != 7 {
                gw.accounts.insert(addr, encode_account(&shard(i)));
            }
            addresses.push(addr);
        }
        gw.accounts.insert(addresses[10], vec![0u8; 4]);

        let out = fetch_accounts::<KeywordShard>(&gw, &addresses).unwrap();
        assert_eq!(out.len(), 150);
        assert_eq!(gw.batch_calls.get(), 2);
        assert!(out[7].as_ref().unwrap().is_none());
        assert!(matches!(out[10], Err(SdkError::TruncatedData { .. })));
        let last = out[149].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(last.shard_index, 149);
    }

    #[test]
    fn transport_failure_fails_the_call() {
        let gw = MockGateway {
            down: true,
            ..MockGateway::default()
        };
        assert!(matches!(
            fetch_account::<Vault>(&gw, &Pubkey::new_unique()),
            Err(SdkError::Rpc(_))
        ));
        assert!(fetch_accounts::<Vault>(&gw, &[Pubkey::new_unique()]).is_err());
    }

    #[test]
    fn working_sets_read_through_the_gateway() {
        let mut gw = MockGateway::default();
        let addr = Pubkey::new_unique();
        gw.accounts.insert(addr, encode_account(&shard(0)));
        let source = RpcSource::new(gw);
        let mut ws = WorkingSet::new(&source);
        let s: KeywordShard = ws.require(&addr).unwrap();
        assert_eq!(s.product_ids, vec![1]);
        assert!(ws.ensure_fresh().is_ok());
        assert!(source.gateway().submitted.borrow().is_empty());
    }

    #[test]
    fn submission_is_signed_by_the_payer() {
        let gw = MockGateway::default();
        let payer = Keypair::new();
        let ix = Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![AccountMeta::new(payer.pubkey(), true)],
            data: vec![1, 2, 3],
        };
        let sig = sign_and_submit(&gw, &[ix], &payer).unwrap();
        let sent = gw.submitted.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.account_keys[0], payer.pubkey());
        assert_eq!(sig, sent[0].signatures[0]);
        assert!(sent[0].verify().is_ok());
    }
}
