//! Partial merkle tree verification.
//!
//! Proofs use the standard `merkleblock` encoding: transaction count, the
//! list of node hashes and the traversal flag bits. The tree is walked by
//! [`PartialMerkleTree::extract_matches`], which follows bitcoind's rules.

use bitcoin::{
    TxMerkleNode, Txid,
    consensus::deserialize,
    merkle_tree::{MerkleBlockError, PartialMerkleTree},
};

use crate::{MalformedProofReason, MerkleProofError};

/// Result of walking a structurally valid partial tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    /// Recomputed merkle root.
    pub root: TxMerkleNode,

    /// Matched leaves in tree order.
    pub matches: Vec<Txid>,
}

/// Decodes a partial merkle tree from its wire encoding.
pub fn parse_partial_merkle_tree(bytes: &[u8]) -> Result<PartialMerkleTree, MerkleProofError> {
    deserialize::<PartialMerkleTree>(bytes)
        .map_err(|e| MalformedProofReason::Undecodable(e.to_string()).into())
}

fn malformed(err: MerkleBlockError, num_transactions: u32) -> MalformedProofReason {
    match err {
        MerkleBlockError::NoTransactions => MalformedProofReason::NoTransactions,
        MerkleBlockError::TooManyTransactions => {
            MalformedProofReason::TooManyTransactions(num_transactions)
        }
        MerkleBlockError::TooManyHashes => MalformedProofReason::TooManyHashes,
        MerkleBlockError::NotEnoughBits => MalformedProofReason::NotEnoughBits,
        MerkleBlockError::NotAllBitsConsumed => MalformedProofReason::UnconsumedBits,
        MerkleBlockError::NotAllHashesConsumed => MalformedProofReason::UnconsumedHashes,
        MerkleBlockError::BitsArrayOverflow => MalformedProofReason::BitsArrayOverflow,
        MerkleBlockError::HashesArrayOverflow => MalformedProofReason::HashesArrayOverflow,
        MerkleBlockError::IdenticalHashesFound => MalformedProofReason::IdenticalSiblings,
        other => MalformedProofReason::Other(other.to_string()),
    }
}

/// Recomputes the root of `proof` and collects its matched leaves.
///
/// # Errors
///
/// Returns [`MerkleProofError::MalformedProof`] when the counts of bits and
/// hashes are inconsistent with each other or with the tree shape.
pub fn extract_partial_tree(proof: &PartialMerkleTree) -> Result<ExtractedTree, MerkleProofError> {
    let num_transactions = proof.num_transactions();
    if num_transactions == 0 {
        return Err(MalformedProofReason::NoTransactions.into());
    }

    let mut matches = Vec::new();
    let mut indexes = Vec::new();
    let root = proof
        .extract_matches(&mut matches, &mut indexes)
        .map_err(|e| malformed(e, num_transactions))?;

    Ok(ExtractedTree { root, matches })
}

/// Verifies that `txid` is included under `expected_root` according to `proof`.
///
/// # Errors
///
/// * [`MerkleProofError::MalformedProof`] if the proof is structurally invalid.
/// * [`MerkleProofError::ProofMismatch`] if the recomputed root differs.
/// * [`MerkleProofError::TxNotInProof`] if the proof does not match `txid`.
pub fn verify_tx_inclusion(
    proof: &PartialMerkleTree,
    expected_root: TxMerkleNode,
    txid: Txid,
) -> Result<(), MerkleProofError> {
    let extracted = extract_partial_tree(proof)?;

    if extracted.root != expected_root {
        return Err(MerkleProofError::ProofMismatch {
            expected: expected_root,
            computed: extracted.root,
        });
    }

    if !extracted.matches.contains(&txid) {
        return Err(MerkleProofError::TxNotInProof(txid));
    }

    Ok(())
}
