use solana_sdk::pubkey::Pubkey;

use crate::codec::{AccountLayout, AccountReader, AccountWriter};
use crate::constants::{PRICE_INDEX_NODE_DISCRIMINATOR, SALES_INDEX_NODE_DISCRIMINATOR};
use crate::errors::SdkResult;

/// A product filed under a range node, with the value it was filed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry {
    pub product_id: u64,
    pub value: u64,
}

impl RangeEntry {
    pub const SIZE: usize = 8 + 8;

    fn read(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            product_id: r.u64()?,
            value: r.u64()?,
        })
    }

    fn write(&self, w: &mut AccountWriter) {
        w.u64(self.product_id);
        w.u64(self.value);
    }
}

/// Cached best-seller row kept on sales nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSales {
    pub product_id: u64,
    pub merchant: Pubkey,
    pub sales: u64,
    pub price: u64,
    pub last_update: i64,
}

impl ProductSales {
    // 8 (product_id) + 32 (merchant) + 8 (sales) + 8 (price) + 8 (last_update)
    pub const SIZE: usize = 8 + 32 + 8 + 8 + 8;

    fn read(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            product_id: r.u64()?,
            merchant: r.pubkey()?,
            sales: r.u64()?,
            price: r.u64()?,
            last_update: r.i64()?,
        })
    }

    fn write(&self, w: &mut AccountWriter) {
        w.u64(self.product_id);
        w.pubkey(&self.merchant);
        w.u64(self.sales);
        w.u64(self.price);
        w.i64(self.last_update);
    }
}

/// Node of the price range tree.
///
/// PDA seeds: `["price_index", range_start_le]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceIndexNode {
    pub range_start: u64,
    pub range_end: u64,
    /// Sorted by value, then product id.
    pub entries: Vec<RangeEntry>,
    pub left_child: Option<Pubkey>,
    pub right_child: Option<Pubkey>,
    pub parent: Option<Pubkey>,
    pub height: u8,
    pub bump: u8,
}

impl AccountLayout for PriceIndexNode {
    const NAME: &'static str = "PriceIndexNode";
    const DISCRIMINATOR: [u8; 8] = PRICE_INDEX_NODE_DISCRIMINATOR;
    // 8 + 8 (range_start) + 8 (range_end) + 4 (entries len)
    // + 1 + 1 + 1 (child/parent flags) + 1 (height) + 1 (bump)
    const MIN_LEN: usize = 8 + 8 + 8 + 4 + 1 + 1 + 1 + 1 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            range_start: r.u64()?,
            range_end: r.u64()?,
            entries: r.vec(RangeEntry::SIZE, RangeEntry::read)?,
            left_child: r.option(|r| r.pubkey())?,
            right_child: r.option(|r| r.pubkey())?,
            parent: r.option(|r| r.pubkey())?,
            height: r.u8()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.u64(self.range_start);
        w.u64(self.range_end);
        w.vec(&self.entries, |w, e| e.write(w));
        w.option(self.left_child.as_ref(), |w, k| w.pubkey(k));
        w.option(self.right_child.as_ref(), |w, k| w.pubkey(k));
        w.option(self.parent.as_ref(), |w, k| w.pubkey(k));
        w.u8(self.height);
        w.u8(self.bump);
    }
}

/// Node of the sales range tree; same shape as the price node plus a bounded
/// top-K cache of the node's best sellers.
///
/// PDA seeds: `["sales_index", range_start_le]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesIndexNode {
    pub range_start: u64,
    pub range_end: u64,
    pub entries: Vec<RangeEntry>,
    /// Unordered; at most the configured top-K.
    pub top_items: Vec<ProductSales>,
    pub left_child: Option<Pubkey>,
    pub right_child: Option<Pubkey>,
    pub parent: Option<Pubkey>,
    pub height: u8,
    pub bump: u8,
}

impl AccountLayout for SalesIndexNode {
    const NAME: &'static str = "SalesIndexNode";
    const DISCRIMINATOR: [u8; 8] = SALES_INDEX_NODE_DISCRIMINATOR;
    // 8 + 8 (range_start) + 8 (range_end) + 4 (entries len) + 4 (top_items len)
    // + 1 + 1 + 1 (child/parent flags) + 1 (height) + 1 (bump)
    const MIN_LEN: usize = 8 + 8 + 8 + 4 + 4 + 1 + 1 + 1 + 1 + 1;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self> {
        Ok(Self {
            range_start: r.u64()?,
            range_end: r.u64()?,
            entries: r.vec(RangeEntry::SIZE, RangeEntry::read)?,
            top_items: r.vec(ProductSales::SIZE, ProductSales::read)?,
            left_child: r.option(|r| r.pubkey())?,
            right_child: r.option(|r| r.pubkey())?,
            parent: r.option(|r| r.pubkey())?,
            height: r.u8()?,
            bump: r.u8()?,
        })
    }

    fn write_body(&self, w: &mut AccountWriter) {
        w.u64(self.range_start);
        w.u64(self.range_end);
        w.vec(&self.entries, |w, e| e.write(w));
        w.vec(&self.top_items, |w, t| t.write(w));
        w.option(self.left_child.as_ref(), |w, k| w.pubkey(k));
        w.option(self.right_child.as_ref(), |w, k| w.pubkey(k));
        w.option(self.parent.as_ref(), |w, k| w.pubkey(k));
        w.u8(self.height);
        w.u8(self.bump);
    }
}
