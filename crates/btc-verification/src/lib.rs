//! SPV verification of bitcoin transactions: partial merkle tree proofs and
//! confirmation depth against an external block store.

mod block_store;
mod confirmations;
mod errors;
mod merkle;

#[cfg(any(test, feature = "test-utils"))]
pub use block_store::MockBtcBlockStore;
pub use block_store::{BlockStoreError, BtcBlockStore, ChainTip, InMemoryBlockStore};
pub use confirmations::*;
pub use errors::*;
pub use merkle::*;
