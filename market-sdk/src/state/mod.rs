pub mod ids;
pub mod keyword;
pub mod range;
pub mod vault;

pub use ids::*;
pub use keyword::*;
pub use range::*;
pub use vault::*;

use crate::codec::{peek_discriminator, AccountLayout};
use crate::errors::SdkResult;

/// Which known layout a raw buffer carries, by discriminator.
pub fn account_kind(data: &[u8]) -> SdkResult<Option<&'static str>> {
    let disc = peek_discriminator(data)?;
    let known: [(&'static str, [u8; 8]); 9] = [
        (GlobalIdRoot::NAME, GlobalIdRoot::DISCRIMINATOR),
        (MerchantIdAccount::NAME, MerchantIdAccount::DISCRIMINATOR),
        (IdChunk::NAME, IdChunk::DISCRIMINATOR),
        (KeywordRoot::NAME, KeywordRoot::DISCRIMINATOR),
        (KeywordShard::NAME, KeywordShard::DISCRIMINATOR),
        (PriceIndexNode::NAME, PriceIndexNode::DISCRIMINATOR),
        (SalesIndexNode::NAME, SalesIndexNode::DISCRIMINATOR),
        (Vault::NAME, Vault::DISCRIMINATOR),
        (VaultDepositor::NAME, VaultDepositor::DISCRIMINATOR),
    ];
    Ok(known.iter().find(|(_, d)| *d == disc).map(|(n, _)| *n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_account, encode_account};
    use crate::errors::SdkError;
    use sha2::{Digest, Sha256};
    use solana_sdk::pubkey::Pubkey;

    fn anchor_account_discriminator(name: &str) -> [u8; 8] {
        let out = Sha256::digest(format!("account:{name}").as_bytes());
        out[..8].try_into().expect("slice")
    }

    fn key(b: u8) -> Pubkey {
        Pubkey::new_from_array([b; 32])
    }

    #[test]
    fn discriminators_follow_anchor_convention() {
        assert_eq!(GlobalIdRoot::DISCRIMINATOR, anchor_account_discriminator("GlobalIdRoot"));
        assert_eq!(MerchantIdAccount::DISCRIMINATOR, anchor_account_discriminator("MerchantIdAccount"));
        assert_eq!(IdChunk::DISCRIMINATOR, anchor_account_discriminator("IdChunk"));
        assert_eq!(KeywordRoot::DISCRIMINATOR, anchor_account_discriminator("KeywordRoot"));
        assert_eq!(KeywordShard::DISCRIMINATOR, anchor_account_discriminator("KeywordShard"));
        assert_eq!(PriceIndexNode::DISCRIMINATOR, anchor_account_discriminator("PriceIndexNode"));
        assert_eq!(SalesIndexNode::DISCRIMINATOR, anchor_account_discriminator("SalesIndexNode"));
        assert_eq!(Vault::DISCRIMINATOR, anchor_account_discriminator("Vault"));
        assert_eq!(VaultDepositor::DISCRIMINATOR, anchor_account_discriminator("VaultDepositor"));
    }

    fn empty_shard() -> KeywordShard {
        KeywordShard::empty("", 0, Pubkey::default(), 255)
    }

    #[test]
    fn empty_and_all_none_layouts_are_exactly_min_len() {
        assert_eq!(encode_account(&empty_shard()).len(), KeywordShard::MIN_LEN);

        let node = PriceIndexNode {
            range_start: 0,
            range_end: u64::MAX,
            entries: vec![],
            left_child: None,
            right_child: None,
            parent: None,
            height: 1,
            bump: 0,
        };
        let bytes = encode_account(&node);
        assert_eq!(bytes.len(), PriceIndexNode::MIN_LEN);
        assert_eq!(decode_account::<PriceIndexNode>(&bytes).unwrap(), node);

        let chunk = IdChunk::new(1, 0, 1, 0, 254);
        // size 0 is clamped to a one-id chunk
        assert_eq!(chunk.capacity(), 1);
        assert_eq!(chunk.bitmap.len(), 1);
    }

    #[test]
    fn fixed_arrays_keep_their_width() {
        let root = KeywordRoot {
            keyword: "shoes".into(),
            first_shard: key(1),
            last_shard: key(2),
            total_shards: 1,
            total_products: 0,
            bloom_filter: [0xff; 256],
            bump: 7,
        };
        let bytes = encode_account(&root);
        assert_eq!(bytes.len(), KeywordRoot::MIN_LEN + "shoes".len());
        assert_eq!(decode_account::<KeywordRoot>(&bytes).unwrap(), root);

        let mut shard = empty_shard();
        shard.bloom_summary = [0xaa; 32];
        shard.next_shard = Some(key(9));
        shard.product_ids = vec![1, u64::MAX];
        shard.refresh_bounds();
        let bytes = encode_account(&shard);
        assert_eq!(bytes.len(), KeywordShard::MIN_LEN + 32 + 16);
        assert_eq!(decode_account::<KeywordShard>(&bytes).unwrap(), shard);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = encode_account(&empty_shard());
        bytes.extend_from_slice(&[0u8; 64]);
        assert_eq!(decode_account::<KeywordShard>(&bytes).unwrap(), empty_shard());
    }

    #[test]
    fn wrong_discriminator_is_an_error_not_a_panic() {
        let bytes = encode_account(&empty_shard());
        let err = decode_account::<KeywordRoot>(&bytes).unwrap_err();
        assert!(matches!(err, SdkError::WrongAccountType { expected: "KeywordRoot", .. }));
        assert_eq!(account_kind(&bytes).unwrap(), Some("KeywordShard"));
        assert_eq!(account_kind(&[0u8; 8]).unwrap(), None);
    }

    #[test]
    fn short_buffers_are_truncated_data() {
        assert!(matches!(
            decode_account::<Vault>(&[1, 2, 3]),
            Err(SdkError::TruncatedData { needed: 8, available: 3 })
        ));
        let mut bytes = Vault::DISCRIMINATOR.to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            decode_account::<Vault>(&bytes),
            Err(SdkError::TruncatedData { .. })
        ));

        // vector length prefix promising more than the buffer holds
        let mut shard = empty_shard();
        shard.product_ids = vec![1, 2, 3];
        let bytes = encode_account(&shard);
        let cut = &bytes[..bytes.len() - 60];
        assert!(matches!(
            decode_account::<KeywordShard>(cut),
            Err(SdkError::TruncatedData { .. })
        ));
    }

    #[test]
    fn vault_and_depositor_survive_extreme_values() {
        let vault = Vault {
            owner: key(1),
            stake_mint: key(2),
            vault_token_account: key(3),
            platform_account: key(4),
            total_shares: u64::MAX,
            total_assets: 0,
            total_rewards: 1,
            rewards_per_share: u128::MAX,
            last_rewards_update: i64::MIN,
            management_fee: 10_000,
            min_stake_amount: 0,
            max_total_assets: u64::MAX,
            unstake_lockup_period: i64::MAX,
            is_paused: true,
            shares_base: 1_000,
            rebase_version: u32::MAX,
            owner_shares: 5,
            pending_unstake_shares: 6,
            reserved_assets: 7,
            created_at: -1,
            bump: 255,
        };
        let bytes = encode_account(&vault);
        assert_eq!(bytes.len(), Vault::MIN_LEN);
        assert_eq!(decode_account::<Vault>(&bytes).unwrap(), vault);

        let mut dep = VaultDepositor::new(key(1), key(2), 99, 3);
        dep.unstake_request = UnstakeRequest {
            shares: 10,
            request_time: 100,
            asset_per_share_at_request: u128::MAX - 1,
            reserved_assets: 11,
        };
        let bytes = encode_account(&dep);
        assert_eq!(bytes.len(), VaultDepositor::MIN_LEN);
        assert_eq!(decode_account::<VaultDepositor>(&bytes).unwrap(), dep);
    }

    #[test]
    fn sales_node_with_top_items_decodes() {
        let node = SalesIndexNode {
            range_start: 10,
            range_end: 20,
            entries: vec![RangeEntry { product_id: 5, value: 12 }],
            top_items: vec![ProductSales {
                product_id: 5,
                merchant: key(4),
                sales: 12,
                price: 1_000,
                last_update: 1_700_000_000,
            }],
            left_child: Some(key(1)),
            right_child: None,
            parent: Some(key(2)),
            height: 2,
            bump: 250,
        };
        let bytes = encode_account(&node);
        assert_eq!(
            bytes.len(),
            SalesIndexNode::MIN_LEN + RangeEntry::SIZE + ProductSales::SIZE + 32 + 32
        );
        assert_eq!(decode_account::<SalesIndexNode>(&bytes).unwrap(), node);
    }
}
