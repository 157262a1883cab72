//! Client SDK for the marketplace program.
//!
//! Derives program addresses, decodes and encodes the program's accounts, and
//! reproduces the program's catalog-index and staking-vault state transitions
//! off-chain so callers can predict, verify and prepare them.

pub mod bloom;
pub mod catalog;
pub mod codec;
pub mod constants;
pub mod errors;
pub mod instruction;
pub mod pda;
pub mod rpc;
pub mod state;
pub mod store;
pub mod vault;

pub use codec::{decode_account, encode_account, peek_discriminator, AccountLayout};
pub use errors::{SdkError, SdkResult};
pub use pda::ProgramIds;
pub use rpc::{fetch_account, fetch_accounts, RpcGateway, RpcSource};
pub use store::{run_with_fresh_retry, AccountSource, MemoryStore, WorkingSet};
