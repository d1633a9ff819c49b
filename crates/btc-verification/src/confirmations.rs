use bitcoin::block::Header;
use strata_peg_primitives::BtcHeight;
use tracing::*;

use crate::{BtcBlockStore, ConfirmationError};

/// Number of confirmations a block at `height` has under a tip at `tip_height`,
/// counting the block itself. Blocks above the tip have none.
pub fn confirmations_at(height: BtcHeight, tip_height: BtcHeight) -> u32 {
    tip_height
        .checked_sub(height)
        .map_or(0, |depth| depth.saturating_add(1))
}

/// Fetches the best-chain header at `height` and checks it is buried under at
/// least `min_confirmations` blocks.
///
/// # Errors
///
/// * [`ConfirmationError::BlockNotFound`] if the store has no block there.
/// * [`ConfirmationError::InsufficientConfirmations`] if the block is too
///   shallow. Callers should retry on a later sidechain block.
pub fn confirmed_header_at<S>(
    store: &S,
    height: BtcHeight,
    min_confirmations: u32,
) -> Result<Header, ConfirmationError>
where
    S: BtcBlockStore + ?Sized,
{
    let tip = store.get_chain_head()?;
    let actual = confirmations_at(height, tip.height);
    if actual < min_confirmations {
        debug!(
            %height,
            tip = %tip.height,
            %actual,
            required = %min_confirmations,
            "block not deep enough"
        );
        return Err(ConfirmationError::InsufficientConfirmations {
            required: min_confirmations,
            actual,
        });
    }

    store
        .get_block_at_height(height)?
        .ok_or(ConfirmationError::BlockNotFound(height))
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        BlockHash, CompactTarget, TxMerkleNode, block::Version, hashes::Hash,
    };
    use mockall::predicate::eq;

    use super::*;
    use crate::{BlockStoreError, ChainTip, InMemoryBlockStore, MockBtcBlockStore};

    fn header(nonce: u32) -> Header {
        Header {
            version: Version::ONE,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce,
        }
    }

    #[test]
    fn test_confirmations_at() {
        assert_eq!(confirmations_at(10, 10), 1);
        assert_eq!(confirmations_at(5, 10), 6);
        assert_eq!(confirmations_at(11, 10), 0);
    }

    #[test]
    fn test_enough_confirmations() {
        let mut store = InMemoryBlockStore::new(100);
        for n in 0..10 {
            store.push(header(n));
        }
        // Tip is 109, block 103 has 7 confirmations.
        let hdr = confirmed_header_at(&store, 103, 7).unwrap();
        assert_eq!(hdr, header(3));
    }

    #[test]
    fn test_insufficient_confirmations_is_retryable() {
        let mut store = InMemoryBlockStore::new(100);
        for n in 0..10 {
            store.push(header(n));
        }
        let err = confirmed_header_at(&store, 104, 7).unwrap_err();
        assert_eq!(
            err,
            ConfirmationError::InsufficientConfirmations {
                required: 7,
                actual: 6
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_block_missing_below_base() {
        let mut store = InMemoryBlockStore::new(100);
        store.push(header(0));
        let err = confirmed_header_at(&store, 50, 1).unwrap_err();
        assert_eq!(err, ConfirmationError::BlockNotFound(50));
    }

    #[test]
    fn test_empty_store_errors() {
        let store = InMemoryBlockStore::default();
        let err = confirmed_header_at(&store, 0, 1).unwrap_err();
        assert_eq!(err, ConfirmationError::BlockStore(BlockStoreError::Empty));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_with_mock_store() {
        let mut store = MockBtcBlockStore::new();
        store.expect_get_chain_head().times(1).returning(|| {
            Ok(ChainTip {
                header: header(9),
                height: 120,
            })
        });
        store
            .expect_get_block_at_height()
            .with(eq(115))
            .times(1)
            .returning(|_| Ok(Some(header(4))));

        let hdr = confirmed_header_at(&store, 115, 6).unwrap();
        assert_eq!(hdr, header(4));
    }

    #[test]
    fn test_mock_store_not_queried_when_shallow() {
        let mut store = MockBtcBlockStore::new();
        store.expect_get_chain_head().returning(|| {
            Ok(ChainTip {
                header: header(0),
                height: 120,
            })
        });
        store.expect_get_block_at_height().never();

        assert!(confirmed_header_at(&store, 120, 2).is_err());
    }
}
