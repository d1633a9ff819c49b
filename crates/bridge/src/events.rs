//! Observable effects of bridge operations.

use bitcoin::{ScriptBuf, Txid};
use strata_peg_primitives::{BitcoinAmount, NativeAmount, SidechainAddress, SidechainHeight};
use tracing::*;

use crate::{EventLogError, RefundReason};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BridgeEvent {
    /// A deposit was pegged in and `recipient` credited.
    Locked {
        btc_txid: Txid,
        recipient: SidechainAddress,
        value: BitcoinAmount,
        credited: NativeAmount,
    },

    /// A deposit is going back to its sender.
    RefundQueued {
        btc_txid: Txid,
        refund_txid: Txid,
        reason: RefundReason,
        value: BitcoinAmount,
    },

    /// A refund was too small to pay its own fee and the deposit stays with
    /// the federation.
    DustAbsorbed {
        btc_txid: Txid,
        value: BitcoinAmount,
    },

    /// A dust refund that could not be kept without passing the locking cap.
    DustUntracked {
        btc_txid: Txid,
        value: BitcoinAmount,
    },

    /// The federation moved its own funds.
    FederationSpendRegistered { btc_txid: Txid, outputs: usize },

    FeePerKbChanged { fee_per_kb: BitcoinAmount },

    LockingCapIncreased {
        from: BitcoinAmount,
        to: BitcoinAmount,
    },

    WhitelistEntryAdded { script_pubkey: ScriptBuf },

    WhitelistEntryRemoved { script_pubkey: ScriptBuf },

    WhitelistDisabled { from_height: SidechainHeight },
}

/// Sink for [`BridgeEvent`]s.
///
/// A failing logger never fails the operation that emitted the event.
pub trait BridgeEventLogger {
    fn log(&mut self, event: &BridgeEvent) -> Result<(), EventLogError>;
}

/// Forwards events to `tracing`.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingEventLogger;

impl BridgeEventLogger for TracingEventLogger {
    fn log(&mut self, event: &BridgeEvent) -> Result<(), EventLogError> {
        info!(?event, "bridge event");
        Ok(())
    }
}

/// Keeps events in memory, in emission order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordingEventLogger {
    events: Vec<BridgeEvent>,
}

impl RecordingEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[BridgeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<BridgeEvent> {
        self.events
    }
}

impl BridgeEventLogger for RecordingEventLogger {
    fn log(&mut self, event: &BridgeEvent) -> Result<(), EventLogError> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Logs `event`, downgrading a logger failure to a warning.
pub(crate) fn emit<E: BridgeEventLogger + ?Sized>(logger: &mut E, event: BridgeEvent) {
    if let Err(e) = logger.log(&event) {
        warn!(%e, ?event, "failed to log bridge event");
    }
}
