//! Peg-in registration and federation custody.
//!
//! [`BridgeSupport`] is the entry point. It verifies SPV proofs of bitcoin
//! deposits, classifies the sender, applies the locking cap and lock
//! whitelist, and then either credits the sidechain account or queues a
//! refund back to bitcoin. Governance entry points (fee per kB, locking cap,
//! whitelist) live next to it and are gated by [`Authorizer`]s.
//!
//! All state goes through the [`BridgeStorage`], [`NativeLedger`] and
//! [`BridgeEventLogger`] collaborators so that a whole block's worth of
//! registrations can be applied or discarded atomically, see
//! [`process_block_registrations`].

mod election;
mod errors;
mod events;
mod federation;
mod funds;
mod ledger;
mod lock_sender;
mod locking_cap;
pub mod processed;
mod registration;
mod release;
mod storage;
mod utxo;
mod whitelist;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use election::*;
pub use errors::*;
pub use events::*;
pub use federation::*;
pub use funds::*;
pub use ledger::*;
pub use lock_sender::*;
pub use locking_cap::*;
pub use registration::*;
pub use release::*;
pub use storage::*;
pub use utxo::*;
pub use whitelist::*;

use strata_peg_primitives::SidechainAddress;

/// Sidechain account holding the not yet pegged-in native supply.
pub const BRIDGE_ADDRESS: SidechainAddress = SidechainAddress::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00, 0x06,
]);
