use std::collections::BTreeMap;

use bitcoin::Txid;
use strata_peg_primitives::{BitcoinAmount, SidechainHeight};

use crate::{Election, FederationFunds, LockWhitelist, ReleaseTransactionSet, StorageResult};

/// Persistent state of the bridge.
///
/// Reads return owned snapshots and writes replace the whole entity, so an
/// implementation is free to serialize each entity under its own key.
/// Operations are not validated at this level.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait BridgeStorage {
    fn federation_funds(&self) -> StorageResult<FederationFunds>;

    fn set_federation_funds(&mut self, funds: FederationFunds) -> StorageResult<()>;

    fn lock_whitelist(&self) -> StorageResult<LockWhitelist>;

    fn set_lock_whitelist(&mut self, whitelist: LockWhitelist) -> StorageResult<()>;

    /// `None` until the cap is first read and initialized from params.
    fn locking_cap(&self) -> StorageResult<Option<BitcoinAmount>>;

    fn set_locking_cap(&mut self, cap: BitcoinAmount) -> StorageResult<()>;

    /// `None` until governance applies a fee rate.
    fn fee_per_kb(&self) -> StorageResult<Option<BitcoinAmount>>;

    fn set_fee_per_kb(&mut self, fee: BitcoinAmount) -> StorageResult<()>;

    fn fee_per_kb_election(&self) -> StorageResult<Election<BitcoinAmount>>;

    fn set_fee_per_kb_election(&mut self, election: Election<BitcoinAmount>) -> StorageResult<()>;

    /// Sidechain height at which a bitcoin tx was registered.
    fn processed_height(&self, txid: &Txid) -> StorageResult<Option<SidechainHeight>>;

    fn set_processed_height(&mut self, txid: Txid, height: SidechainHeight) -> StorageResult<()>;

    fn release_transactions(&self) -> StorageResult<ReleaseTransactionSet>;

    fn set_release_transactions(&mut self, set: ReleaseTransactionSet) -> StorageResult<()>;
}

/// [`BridgeStorage`] kept in memory.
///
/// Cloning it is how a block's registrations are staged before commit.
#[derive(Clone, Debug)]
pub struct InMemoryBridgeStorage {
    funds: FederationFunds,
    whitelist: LockWhitelist,
    locking_cap: Option<BitcoinAmount>,
    fee_per_kb: Option<BitcoinAmount>,
    fee_per_kb_election: Election<BitcoinAmount>,
    processed: BTreeMap<Txid, SidechainHeight>,
    releases: ReleaseTransactionSet,
}

impl InMemoryBridgeStorage {
    pub fn new(funds: FederationFunds) -> Self {
        Self {
            funds,
            whitelist: LockWhitelist::new(),
            locking_cap: None,
            fee_per_kb: None,
            fee_per_kb_election: Election::new(),
            processed: BTreeMap::new(),
            releases: ReleaseTransactionSet::new(),
        }
    }

    pub fn with_whitelist(mut self, whitelist: LockWhitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_locking_cap(mut self, cap: BitcoinAmount) -> Self {
        self.locking_cap = Some(cap);
        self
    }
}

impl BridgeStorage for InMemoryBridgeStorage {
    fn federation_funds(&self) -> StorageResult<FederationFunds> {
        Ok(self.funds.clone())
    }

    fn set_federation_funds(&mut self, funds: FederationFunds) -> StorageResult<()> {
        self.funds = funds;
        Ok(())
    }

    fn lock_whitelist(&self) -> StorageResult<LockWhitelist> {
        Ok(self.whitelist.clone())
    }

    fn set_lock_whitelist(&mut self, whitelist: LockWhitelist) -> StorageResult<()> {
        self.whitelist = whitelist;
        Ok(())
    }

    fn locking_cap(&self) -> StorageResult<Option<BitcoinAmount>> {
        Ok(self.locking_cap)
    }

    fn set_locking_cap(&mut self, cap: BitcoinAmount) -> StorageResult<()> {
        self.locking_cap = Some(cap);
        Ok(())
    }

    fn fee_per_kb(&self) -> StorageResult<Option<BitcoinAmount>> {
        Ok(self.fee_per_kb)
    }

    fn set_fee_per_kb(&mut self, fee: BitcoinAmount) -> StorageResult<()> {
        self.fee_per_kb = Some(fee);
        Ok(())
    }

    fn fee_per_kb_election(&self) -> StorageResult<Election<BitcoinAmount>> {
        Ok(self.fee_per_kb_election.clone())
    }

    fn set_fee_per_kb_election(&mut self, election: Election<BitcoinAmount>) -> StorageResult<()> {
        self.fee_per_kb_election = election;
        Ok(())
    }

    fn processed_height(&self, txid: &Txid) -> StorageResult<Option<SidechainHeight>> {
        Ok(self.processed.get(txid).copied())
    }

    fn set_processed_height(&mut self, txid: Txid, height: SidechainHeight) -> StorageResult<()> {
        self.processed.insert(txid, height);
        Ok(())
    }

    fn release_transactions(&self) -> StorageResult<ReleaseTransactionSet> {
        Ok(self.releases.clone())
    }

    fn set_release_transactions(&mut self, set: ReleaseTransactionSet) -> StorageResult<()> {
        self.releases = set;
        Ok(())
    }
}
