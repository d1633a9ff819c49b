//! Primitive types shared by the peg crates: monetary amounts for both chains,
//! sidechain addresses and the minimal view of a sidechain transaction.

mod address;
mod amount;
mod errors;
mod tx;

pub use address::*;
pub use amount::*;
pub use errors::*;
pub use tx::*;

/// Bitcoin block height.
pub type BtcHeight = u32;

/// Sidechain block number.
pub type SidechainHeight = u64;
