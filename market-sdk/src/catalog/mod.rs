//! Catalog indices kept in program accounts: per-merchant id allocation, the
//! keyword index and the price/sales range trees.

pub mod id_allocator;
pub mod keyword_index;
pub mod range_index;

pub use id_allocator::{
    allocate_id, chunk_utilization, initialize_global_root, register_merchant, release_id,
    ChunkUtilization, MerchantRegistration, RootParams,
};
pub use keyword_index::{
    index_product, index_product_keywords, list_products, may_contain, remove_product,
};
pub use range_index::{BestSeller, RangeNode, TreeLinks, TreeStats};
