use bitcoin::block::Header;
use strata_peg_primitives::BtcHeight;
use thiserror::Error;

/// Tip of the best bitcoin chain known to the block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub header: Header,
    pub height: BtcHeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockStoreError {
    #[error("block store has no blocks")]
    Empty,

    #[error("block store backend: {0}")]
    Backend(String),
}

/// Read access to the best bitcoin header chain.
///
/// One instance is handed out per ledger snapshot, so repeated queries within
/// a single registration see the same chain.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait BtcBlockStore {
    /// Header of the best-chain block at `height`, if the chain is that long.
    fn get_block_at_height(&self, height: BtcHeight) -> Result<Option<Header>, BlockStoreError>;

    /// Current best-chain tip.
    fn get_chain_head(&self) -> Result<ChainTip, BlockStoreError>;
}

/// Header chain held in memory, starting at `base_height`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlockStore {
    base_height: BtcHeight,
    headers: Vec<Header>,
}

impl InMemoryBlockStore {
    pub fn new(base_height: BtcHeight) -> Self {
        Self {
            base_height,
            headers: Vec::new(),
        }
    }

    /// Appends a header as the new tip and returns its height.
    pub fn push(&mut self, header: Header) -> BtcHeight {
        self.headers.push(header);
        self.base_height + self.headers.len() as BtcHeight - 1
    }
}

impl BtcBlockStore for InMemoryBlockStore {
    fn get_block_at_height(&self, height: BtcHeight) -> Result<Option<Header>, BlockStoreError> {
        let Some(offset) = height.checked_sub(self.base_height) else {
            return Ok(None);
        };
        Ok(self.headers.get(offset as usize).copied())
    }

    fn get_chain_head(&self) -> Result<ChainTip, BlockStoreError> {
        let header = *self.headers.last().ok_or(BlockStoreError::Empty)?;
        Ok(ChainTip {
            header,
            height: self.base_height + self.headers.len() as BtcHeight - 1,
        })
    }
}
