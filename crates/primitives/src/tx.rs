use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::SidechainAddress;

/// The parts of the calling sidechain transaction the peg logic looks at.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Arbitrary,
    BorshDeserialize,
    BorshSerialize,
    Deserialize,
    Serialize,
)]
pub struct SidechainTx {
    sender: SidechainAddress,
    hash: [u8; 32],
}

impl SidechainTx {
    pub fn new(sender: SidechainAddress, hash: [u8; 32]) -> Self {
        Self { sender, hash }
    }

    pub fn sender(&self) -> SidechainAddress {
        self.sender
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }
}
