use serde::{Deserialize, Serialize};
use strata_peg_primitives::SidechainHeight;

/// Consensus rule changes gated on a sidechain activation height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConsensusRule {
    /// Enforce the locking cap on peg-ins.
    LockingCap,

    /// Accept P2SH-wrapped segwit and multisig senders, not just P2PKH.
    SegwitCompatibleLockSenders,
}

/// Activation heights for each [`ConsensusRule`]. A missing height means the
/// rule never activates.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default)]
    pub locking_cap: Option<SidechainHeight>,

    #[serde(default)]
    pub segwit_compatible_lock_senders: Option<SidechainHeight>,
}

impl ActivationConfig {
    /// Every rule active from genesis.
    pub fn all_active() -> Self {
        Self {
            locking_cap: Some(0),
            segwit_compatible_lock_senders: Some(0),
        }
    }

    pub fn activation_height(&self, rule: ConsensusRule) -> Option<SidechainHeight> {
        match rule {
            ConsensusRule::LockingCap => self.locking_cap,
            ConsensusRule::SegwitCompatibleLockSenders => self.segwit_compatible_lock_senders,
        }
    }

    /// Snapshot of which rules apply at sidechain height `height`.
    pub fn for_block(&self, height: SidechainHeight) -> Activations {
        Activations {
            locking_cap: self.is_active_at(ConsensusRule::LockingCap, height),
            segwit_compatible_lock_senders: self
                .is_active_at(ConsensusRule::SegwitCompatibleLockSenders, height),
        }
    }

    fn is_active_at(&self, rule: ConsensusRule, height: SidechainHeight) -> bool {
        self.activation_height(rule).is_some_and(|h| height >= h)
    }
}

/// Rules in effect for one sidechain block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Activations {
    locking_cap: bool,
    segwit_compatible_lock_senders: bool,
}

impl Activations {
    pub fn new(locking_cap: bool, segwit_compatible_lock_senders: bool) -> Self {
        Self {
            locking_cap,
            segwit_compatible_lock_senders,
        }
    }

    pub fn is_active(&self, rule: ConsensusRule) -> bool {
        match rule {
            ConsensusRule::LockingCap => self.locking_cap,
            ConsensusRule::SegwitCompatibleLockSenders => self.segwit_compatible_lock_senders,
        }
    }
}
