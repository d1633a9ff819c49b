use bitcoin::{TxMerkleNode, Txid};
use strata_peg_primitives::BtcHeight;
use thiserror::Error;

use crate::BlockStoreError;

/// Structural defects of a partial merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedProofReason {
    #[error("could not decode proof bytes: {0}")]
    Undecodable(String),

    #[error("proof declares zero transactions")]
    NoTransactions,

    #[error("proof declares {0} transactions, more than a block can hold")]
    TooManyTransactions(u32),

    #[error("proof has more hashes than transactions")]
    TooManyHashes,

    #[error("proof has fewer bits than hashes")]
    NotEnoughBits,

    #[error("ran out of bits while walking the tree")]
    BitsArrayOverflow,

    #[error("ran out of hashes while walking the tree")]
    HashesArrayOverflow,

    /// Duplicated sibling subtrees (CVE-2012-2459).
    #[error("identical left and right subtree hashes")]
    IdenticalSiblings,

    #[error("not all bits were consumed")]
    UnconsumedBits,

    #[error("not all hashes were consumed")]
    UnconsumedHashes,

    #[error("{0}")]
    Other(String),
}

/// Errors from verifying transaction inclusion in a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleProofError {
    #[error("malformed proof: {0}")]
    MalformedProof(#[from] MalformedProofReason),

    #[error("merkle root mismatch: header has {expected}, proof yields {computed}")]
    ProofMismatch {
        expected: TxMerkleNode,
        computed: TxMerkleNode,
    },

    #[error("transaction {0} is not among the proof's matched leaves")]
    TxNotInProof(Txid),
}

/// Errors from checking a block's confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("no block at height {0}")]
    BlockNotFound(BtcHeight),

    /// Retry once more blocks have been mined on top.
    #[error("block has {actual} confirmations, {required} required")]
    InsufficientConfirmations { required: u32, actual: u32 },

    #[error("block store: {0}")]
    BlockStore(#[from] BlockStoreError),
}

impl ConfirmationError {
    /// Whether the same request may succeed against a later chain state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InsufficientConfirmations { .. })
    }
}
