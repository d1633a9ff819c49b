//! Replay protection: which bitcoin transactions were already registered.

use bitcoin::Txid;
use strata_peg_primitives::SidechainHeight;
use tracing::*;

use crate::{BridgeStorage, ProcessedTxError, StorageResult};

/// Returned to legacy callers for a hash that was never registered.
pub const NOT_PROCESSED_HEIGHT: i64 = -1;

pub fn is_processed<S: BridgeStorage + ?Sized>(storage: &S, txid: &Txid) -> StorageResult<bool> {
    Ok(storage.processed_height(txid)?.is_some())
}

pub fn processed_height<S: BridgeStorage + ?Sized>(
    storage: &S,
    txid: &Txid,
) -> StorageResult<Option<SidechainHeight>> {
    storage.processed_height(txid)
}

/// Like [`processed_height`] but with [`NOT_PROCESSED_HEIGHT`] for absent
/// hashes.
pub fn processed_height_legacy<S: BridgeStorage + ?Sized>(
    storage: &S,
    txid: &Txid,
) -> StorageResult<i64> {
    Ok(storage
        .processed_height(txid)?
        .map_or(NOT_PROCESSED_HEIGHT, |h| h as i64))
}

/// Records `txid` as registered at `height`.
///
/// # Errors
///
/// [`ProcessedTxError::AlreadyMarked`] if it was recorded before. Callers
/// check first, so hitting this means state is corrupt.
pub fn mark_processed<S: BridgeStorage + ?Sized>(
    storage: &mut S,
    txid: Txid,
    height: SidechainHeight,
) -> Result<(), ProcessedTxError> {
    if let Some(prev) = storage.processed_height(&txid)? {
        error!(%txid, %prev, "tx marked processed twice");
        return Err(ProcessedTxError::AlreadyMarked { txid, height: prev });
    }
    storage.set_processed_height(txid, height)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bitcoin::{Network, hashes::Hash};

    use super::*;
    use crate::{FederationFunds, InMemoryBridgeStorage, test_utils::test_federation};

    fn storage() -> InMemoryBridgeStorage {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        InMemoryBridgeStorage::new(FederationFunds::new(fed))
    }

    #[test]
    fn test_unknown_hash() {
        let s = storage();
        let txid = Txid::from_byte_array([7; 32]);
        assert!(!is_processed(&s, &txid).unwrap());
        assert_eq!(processed_height(&s, &txid).unwrap(), None);
        assert_eq!(processed_height_legacy(&s, &txid).unwrap(), -1);
    }

    #[test]
    fn test_mark_once() {
        let mut s = storage();
        let txid = Txid::from_byte_array([7; 32]);
        mark_processed(&mut s, txid, 42).unwrap();
        assert!(is_processed(&s, &txid).unwrap());
        assert_eq!(processed_height_legacy(&s, &txid).unwrap(), 42);

        let err = mark_processed(&mut s, txid, 43).unwrap_err();
        assert_eq!(err, ProcessedTxError::AlreadyMarked { txid, height: 42 });
        assert_eq!(processed_height(&s, &txid).unwrap(), Some(42));
    }
}
