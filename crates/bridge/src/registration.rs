//! Registration of bitcoin deposits and the governance entry points.

use bitcoin::{Address, OutPoint, Transaction, Txid, consensus};
use strata_peg_btc_verification::{
    BtcBlockStore, confirmed_header_at, parse_partial_merkle_tree, verify_tx_inclusion,
};
use strata_peg_params::{Activations, BridgeParams, ConsensusRule};
use strata_peg_primitives::{
    BitcoinAmount, BtcHeight, NativeAmount, SidechainAddress, SidechainHeight, SidechainTx,
};
use tracing::*;

use crate::{
    AddressBasedAuthorizer, Authorizer, BRIDGE_ADDRESS, BridgeEvent, BridgeEventLogger,
    BridgeStorage, CapIncreaseOutcome, ElectionError, FederationFunds, FederationRole,
    FederationUtxo, InvalidProposal, LockContext, LockDecision, LockSender, LockSenderProvider,
    NativeLedger, RecordingEventLogger, RefundError, RefundReason, RegistrationError,
    ReleaseEntry, ReleaseInput, StorageResult, TxSenderType, VoteOutcome, WhitelistEntry,
    build_refund_tx, cast_vote, evaluate_lock, events::emit, get_or_init_locking_cap,
    increase_locking_cap, plain_signature_sender, processed,
};

/// Read-only collaborators shared by every registration in a block.
#[derive(Debug)]
pub struct BridgeEnv<'a, B: ?Sized, P: ?Sized> {
    pub params: &'a BridgeParams,
    pub block_store: &'a B,
    pub sender_provider: &'a P,
}

/// What a registered transaction ended up doing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegistrationOutcome {
    Locked {
        btc_txid: Txid,
        recipient: SidechainAddress,
        value: BitcoinAmount,
        credited: NativeAmount,
    },
    Refunded {
        btc_txid: Txid,
        refund_txid: Txid,
        reason: RefundReason,
        refunded: BitcoinAmount,
    },
    /// The refund could not pay its own fee, the federation keeps the value.
    DustAbsorbed {
        btc_txid: Txid,
        value: BitcoinAmount,
    },
    /// The refund could not pay its own fee and keeping the value would
    /// take custody above the locking cap. The outputs are not tracked.
    DustUntracked {
        btc_txid: Txid,
        value: BitcoinAmount,
    },
    /// A transaction moving federation funds.
    FederationSpend { btc_txid: Txid, outputs: usize },
}

/// Result of a whitelist management call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WhitelistOutcome {
    Applied,
    AlreadyPresent,
    NotFound,
    AlreadyDisabled,
    InvalidDelay,
    Unauthorized,
}

impl WhitelistOutcome {
    pub fn legacy_code(&self) -> i32 {
        match self {
            Self::Applied => 1,
            Self::AlreadyPresent | Self::NotFound | Self::AlreadyDisabled => -1,
            Self::InvalidDelay => -2,
            Self::Unauthorized => -10,
        }
    }
}

/// Federation output found in a registered transaction.
#[derive(Copy, Clone, Debug)]
struct FederationOutput {
    role: FederationRole,
    vout: u32,
    value: BitcoinAmount,
}

/// Bridge operations executed within one sidechain block.
#[derive(Debug)]
pub struct BridgeSupport<'a, S: ?Sized, L: ?Sized, E: ?Sized, B: ?Sized, P: ?Sized> {
    params: &'a BridgeParams,
    block_store: &'a B,
    sender_provider: &'a P,
    height: SidechainHeight,
    activations: Activations,
    storage: &'a mut S,
    ledger: &'a mut L,
    events: &'a mut E,
}

impl<'a, S, L, E, B, P> BridgeSupport<'a, S, L, E, B, P>
where
    S: BridgeStorage + ?Sized,
    L: NativeLedger + ?Sized,
    E: BridgeEventLogger + ?Sized,
    B: BtcBlockStore + ?Sized,
    P: LockSenderProvider + ?Sized,
{
    pub fn new(
        env: &BridgeEnv<'a, B, P>,
        height: SidechainHeight,
        storage: &'a mut S,
        ledger: &'a mut L,
        events: &'a mut E,
    ) -> Self {
        Self {
            params: env.params,
            block_store: env.block_store,
            sender_provider: env.sender_provider,
            height,
            activations: env.params.activations.for_block(height),
            storage,
            ledger,
            events,
        }
    }

    pub fn height(&self) -> SidechainHeight {
        self.height
    }

    /// Registers a bitcoin transaction paying the federation.
    ///
    /// Verifies the inclusion proof and confirmation depth, then either
    /// credits the sender's sidechain account or queues a refund. The
    /// transaction is marked processed in both cases. On error nothing is
    /// written unless the error is consensus fatal, in which case the whole
    /// block must be discarded.
    pub fn register_btc_transaction(
        &mut self,
        tx: &SidechainTx,
        raw_tx: &[u8],
        btc_height: BtcHeight,
        pmt: &[u8],
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let btc_tx: Transaction = consensus::deserialize(raw_tx)
            .map_err(|e| RegistrationError::InvalidTransaction(e.to_string()))?;
        let txid = btc_tx.compute_txid();

        let res = self.register_decoded(&btc_tx, btc_height, pmt);
        match &res {
            Ok(outcome) => info!(sender = %tx.sender(), %txid, ?outcome, "registered btc tx"),
            Err(e) if e.is_consensus_fatal() => error!(%txid, %e, "btc tx registration failed"),
            Err(e) => debug!(%txid, %e, stage = ?e.stage(), "btc tx not registered"),
        }
        res
    }

    fn register_decoded(
        &mut self,
        btc_tx: &Transaction,
        btc_height: BtcHeight,
        pmt: &[u8],
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let txid = btc_tx.compute_txid();

        if let Some(height) = processed::processed_height(&*self.storage, &txid)? {
            return Err(RegistrationError::AlreadyProcessed { txid, height });
        }

        let proof = parse_partial_merkle_tree(pmt)?;
        let header =
            confirmed_header_at(self.block_store, btc_height, self.params.min_btc_confirmations)?;
        verify_tx_inclusion(&proof, header.merkle_root, txid)?;

        let mut funds = self.storage.federation_funds()?;
        let outputs = federation_outputs(&funds, btc_tx);
        if outputs.is_empty() {
            return Err(RegistrationError::NoMatchingOutput(txid));
        }

        if is_federation_spend(&funds, btc_tx) {
            return self.settle_federation_spend(funds, btc_tx, btc_height, &outputs);
        }

        let sender = self.classify_sender(btc_tx)?;

        let total = BitcoinAmount::try_sum(outputs.iter().map(|o| o.value))?;
        if total < self.params.min_lock_value {
            return Err(RegistrationError::BelowMinimumLockValue {
                txid,
                value: total,
                minimum: self.params.min_lock_value,
            });
        }

        let decision = self.evaluate_policy(&funds, &sender, total)?;

        let outcome = match (decision, sender.sidechain_address()) {
            (LockDecision::Lock, Some(recipient)) => {
                let credited = NativeAmount::from_btc(total);
                self.ledger.transfer(&BRIDGE_ADDRESS, &recipient, credited)?;
                add_utxos(&mut funds, btc_tx, btc_height, &outputs)?;
                self.storage.set_federation_funds(funds)?;
                RegistrationOutcome::Locked {
                    btc_txid: txid,
                    recipient,
                    value: total,
                    credited,
                }
            }
            (LockDecision::Lock, None) => self.settle_refund(
                funds,
                btc_tx,
                btc_height,
                &outputs,
                &sender,
                RefundReason::NoSidechainDestination,
            )?,
            (LockDecision::Refund(reason), _) => {
                self.settle_refund(funds, btc_tx, btc_height, &outputs, &sender, reason)?
            }
        };

        processed::mark_processed(self.storage, txid, self.height)?;
        emit(self.events, outcome_event(&outcome));
        Ok(outcome)
    }

    fn classify_sender(&self, btc_tx: &Transaction) -> Result<LockSender, RegistrationError> {
        let txid = btc_tx.compute_txid();
        let network = self.params.network;

        let sender = match self.sender_provider.try_get(btc_tx, network) {
            Some(sender) => sender,
            None => plain_signature_sender(btc_tx, network)
                .ok_or(RegistrationError::UnknownSender(txid))?,
        };

        if sender.tx_type() != TxSenderType::P2pkh
            && !self.activations.is_active(ConsensusRule::SegwitCompatibleLockSenders)
        {
            return Err(RegistrationError::SenderNotAccepted {
                txid,
                sender_type: sender.tx_type(),
            });
        }
        Ok(sender)
    }

    fn evaluate_policy(
        &mut self,
        funds: &FederationFunds,
        sender: &LockSender,
        total: BitcoinAmount,
    ) -> Result<LockDecision, RegistrationError> {
        if sender.sidechain_address().is_none() {
            return Ok(LockDecision::Refund(RefundReason::NoSidechainDestination));
        }

        let locking_cap = if self.activations.is_active(ConsensusRule::LockingCap) {
            get_or_init_locking_cap(self.storage, self.params)?
        } else {
            BitcoinAmount::ZERO
        };
        let ctx = LockContext {
            activations: self.activations,
            height: self.height,
            locking_cap,
            custody: funds.custody_total()?,
        };

        let mut whitelist = self.storage.lock_whitelist()?;
        let before = whitelist.len();
        let sender_script = sender.btc_address().script_pubkey();
        let decision = evaluate_lock(&ctx, &mut whitelist, &sender_script, total);
        if whitelist.len() != before {
            self.storage.set_lock_whitelist(whitelist)?;
        }
        Ok(decision)
    }

    fn settle_refund(
        &mut self,
        mut funds: FederationFunds,
        btc_tx: &Transaction,
        btc_height: BtcHeight,
        outputs: &[FederationOutput],
        sender: &LockSender,
        reason: RefundReason,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let txid = btc_tx.compute_txid();
        let fee_per_kb = self.fee_per_kb()?;

        let refund = {
            let mut inputs = Vec::with_capacity(outputs.len());
            for o in outputs {
                let Some(slot) = funds.slot(o.role) else {
                    continue;
                };
                inputs.push(ReleaseInput {
                    outpoint: OutPoint::new(txid, o.vout),
                    value: o.value,
                    federation: slot.federation(),
                });
            }
            build_refund_tx(&inputs, sender.btc_address(), fee_per_kb)
        };

        match refund {
            Ok(refund_tx) => {
                let refunded =
                    BitcoinAmount::try_sum(refund_tx.output.iter().map(|o| o.value.into()))?;
                let refund_txid = refund_tx.compute_txid();
                let mut releases = self.storage.release_transactions()?;
                releases.add(ReleaseEntry::new(refund_tx, self.height));
                self.storage.set_release_transactions(releases)?;
                Ok(RegistrationOutcome::Refunded {
                    btc_txid: txid,
                    refund_txid,
                    reason,
                    refunded,
                })
            }
            Err(RefundError::Dust { value, fee }) => {
                if !self.fits_locking_cap(&funds, value)? {
                    warn!(
                        %txid, %value, %fee, ?reason,
                        "dust refund would exceed locking cap, not tracking deposit"
                    );
                    return Ok(RegistrationOutcome::DustUntracked {
                        btc_txid: txid,
                        value,
                    });
                }
                warn!(%txid, %value, %fee, ?reason, "refund would be dust, keeping deposit");
                add_utxos(&mut funds, btc_tx, btc_height, outputs)?;
                self.storage.set_federation_funds(funds)?;
                Ok(RegistrationOutcome::DustAbsorbed {
                    btc_txid: txid,
                    value,
                })
            }
            Err(RefundError::NoInputs) => Err(RegistrationError::NoMatchingOutput(txid)),
            Err(RefundError::Amount(e)) => Err(e.into()),
        }
    }

    /// Whether custody may grow by `value` without passing the active cap.
    fn fits_locking_cap(
        &mut self,
        funds: &FederationFunds,
        value: BitcoinAmount,
    ) -> Result<bool, RegistrationError> {
        if !self.activations.is_active(ConsensusRule::LockingCap) {
            return Ok(true);
        }
        let cap = get_or_init_locking_cap(self.storage, self.params)?;
        let after = funds.custody_total()?.checked_add(value);
        Ok(after.is_some_and(|after| after <= cap))
    }

    fn settle_federation_spend(
        &mut self,
        mut funds: FederationFunds,
        btc_tx: &Transaction,
        btc_height: BtcHeight,
        outputs: &[FederationOutput],
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let txid = btc_tx.compute_txid();
        for input in &btc_tx.input {
            if funds.is_tracked(&input.previous_output) {
                funds.remove_utxo(&input.previous_output)?;
            }
        }
        add_utxos(&mut funds, btc_tx, btc_height, outputs)?;
        self.storage.set_federation_funds(funds)?;
        processed::mark_processed(self.storage, txid, self.height)?;

        let outcome = RegistrationOutcome::FederationSpend {
            btc_txid: txid,
            outputs: outputs.len(),
        };
        emit(self.events, outcome_event(&outcome));
        Ok(outcome)
    }

    pub fn is_btc_tx_hash_already_processed(&self, txid: &Txid) -> StorageResult<bool> {
        processed::is_processed(&*self.storage, txid)
    }

    /// Height at which `txid` was registered, `-1` if never.
    pub fn btc_tx_hash_processed_height(&self, txid: &Txid) -> StorageResult<i64> {
        processed::processed_height_legacy(&*self.storage, txid)
    }

    pub fn get_locking_cap(&mut self) -> StorageResult<BitcoinAmount> {
        get_or_init_locking_cap(self.storage, self.params)
    }

    pub fn increase_locking_cap(
        &mut self,
        tx: &SidechainTx,
        proposed: BitcoinAmount,
    ) -> StorageResult<CapIncreaseOutcome> {
        let authorizer = AddressBasedAuthorizer::from(&self.params.locking_cap_authorizer);
        let outcome = increase_locking_cap(self.storage, self.params, &authorizer, tx, proposed)?;
        if let CapIncreaseOutcome::Applied { from, to } = outcome {
            emit(self.events, BridgeEvent::LockingCapIncreased { from, to });
        }
        Ok(outcome)
    }

    /// Fee rate used for refunds.
    pub fn fee_per_kb(&self) -> StorageResult<BitcoinAmount> {
        Ok(self
            .storage
            .fee_per_kb()?
            .unwrap_or(self.params.genesis_fee_per_kb))
    }

    /// Votes for a new refund fee rate.
    pub fn vote_fee_per_kb_change(
        &mut self,
        tx: &SidechainTx,
        proposal: Option<BitcoinAmount>,
    ) -> Result<VoteOutcome<BitcoinAmount>, ElectionError> {
        let authorizer = AddressBasedAuthorizer::from(&self.params.fee_per_kb_authorizer);
        let max = self.params.max_fee_per_kb;
        let mut election = self.storage.fee_per_kb_election()?;

        let outcome = cast_vote(&mut election, &authorizer, tx, proposal, |fee| {
            if *fee == BitcoinAmount::ZERO {
                Err(InvalidProposal::NotPositive)
            } else if *fee > max {
                Err(InvalidProposal::AboveMaximum)
            } else {
                Ok(())
            }
        })?;

        self.storage.set_fee_per_kb_election(election)?;
        if let VoteOutcome::Applied(fee_per_kb) = outcome {
            self.storage.set_fee_per_kb(fee_per_kb)?;
            emit(self.events, BridgeEvent::FeePerKbChanged { fee_per_kb });
        }
        Ok(outcome)
    }

    pub fn add_one_off_whitelist_address(
        &mut self,
        tx: &SidechainTx,
        address: &Address,
        max_value: BitcoinAmount,
    ) -> StorageResult<WhitelistOutcome> {
        self.add_whitelist_entry(tx, address, WhitelistEntry::OneOff { max_value })
    }

    pub fn add_unlimited_whitelist_address(
        &mut self,
        tx: &SidechainTx,
        address: &Address,
    ) -> StorageResult<WhitelistOutcome> {
        self.add_whitelist_entry(tx, address, WhitelistEntry::Unlimited)
    }

    fn add_whitelist_entry(
        &mut self,
        tx: &SidechainTx,
        address: &Address,
        entry: WhitelistEntry,
    ) -> StorageResult<WhitelistOutcome> {
        if !self.is_whitelist_authorized(tx) {
            return Ok(WhitelistOutcome::Unauthorized);
        }
        let mut whitelist = self.storage.lock_whitelist()?;
        let script_pubkey = address.script_pubkey();
        if !whitelist.put(script_pubkey.clone(), entry) {
            return Ok(WhitelistOutcome::AlreadyPresent);
        }
        self.storage.set_lock_whitelist(whitelist)?;
        emit(self.events, BridgeEvent::WhitelistEntryAdded { script_pubkey });
        Ok(WhitelistOutcome::Applied)
    }

    pub fn remove_whitelist_address(
        &mut self,
        tx: &SidechainTx,
        address: &Address,
    ) -> StorageResult<WhitelistOutcome> {
        if !self.is_whitelist_authorized(tx) {
            return Ok(WhitelistOutcome::Unauthorized);
        }
        let mut whitelist = self.storage.lock_whitelist()?;
        let script_pubkey = address.script_pubkey();
        if !whitelist.remove(&script_pubkey) {
            return Ok(WhitelistOutcome::NotFound);
        }
        self.storage.set_lock_whitelist(whitelist)?;
        emit(self.events, BridgeEvent::WhitelistEntryRemoved { script_pubkey });
        Ok(WhitelistOutcome::Applied)
    }

    /// Disables the whitelist `delay` blocks from now. Can only be done once.
    pub fn set_whitelist_disable_block_delay(
        &mut self,
        tx: &SidechainTx,
        delay: u64,
    ) -> StorageResult<WhitelistOutcome> {
        if !self.is_whitelist_authorized(tx) {
            return Ok(WhitelistOutcome::Unauthorized);
        }
        let mut whitelist = self.storage.lock_whitelist()?;
        if whitelist.disable_block().is_some() {
            return Ok(WhitelistOutcome::AlreadyDisabled);
        }
        let Some(from_height) = self.height.checked_add(delay) else {
            return Ok(WhitelistOutcome::InvalidDelay);
        };
        whitelist.set_disable_block(from_height);
        self.storage.set_lock_whitelist(whitelist)?;
        emit(self.events, BridgeEvent::WhitelistDisabled { from_height });
        Ok(WhitelistOutcome::Applied)
    }

    fn is_whitelist_authorized(&self, tx: &SidechainTx) -> bool {
        let authorized =
            AddressBasedAuthorizer::from(&self.params.lock_whitelist_authorizer).is_authorized(tx);
        if !authorized {
            warn!(sender = %tx.sender(), "unauthorized whitelist change");
        }
        authorized
    }
}

fn federation_outputs(funds: &FederationFunds, btc_tx: &Transaction) -> Vec<FederationOutput> {
    btc_tx
        .output
        .iter()
        .enumerate()
        .filter_map(|(vout, out)| {
            funds.role_paid_by(&out.script_pubkey).map(|role| FederationOutput {
                role,
                vout: vout as u32,
                value: out.value.into(),
            })
        })
        .collect()
}

fn is_federation_spend(funds: &FederationFunds, btc_tx: &Transaction) -> bool {
    funds
        .retiring()
        .into_iter()
        .chain([funds.active()])
        .any(|slot| btc_tx.input.iter().any(|input| slot.federation().is_spent_by(input)))
}

fn add_utxos(
    funds: &mut FederationFunds,
    btc_tx: &Transaction,
    btc_height: BtcHeight,
    outputs: &[FederationOutput],
) -> Result<(), RegistrationError> {
    let txid = btc_tx.compute_txid();
    let is_segwit = btc_tx.input.iter().any(|i| !i.witness.is_empty());
    for o in outputs {
        let Some(redeem_script) = funds
            .slot(o.role)
            .map(|s| s.federation().redeem_script().to_owned())
        else {
            continue;
        };
        let utxo = FederationUtxo::new(
            OutPoint::new(txid, o.vout),
            o.value,
            btc_height,
            is_segwit,
            redeem_script,
        );
        funds.add_utxo(o.role, utxo)?;
    }
    Ok(())
}

fn outcome_event(outcome: &RegistrationOutcome) -> BridgeEvent {
    match *outcome {
        RegistrationOutcome::Locked {
            btc_txid,
            recipient,
            value,
            credited,
        } => BridgeEvent::Locked {
            btc_txid,
            recipient,
            value,
            credited,
        },
        RegistrationOutcome::Refunded {
            btc_txid,
            refund_txid,
            reason,
            refunded,
        } => BridgeEvent::RefundQueued {
            btc_txid,
            refund_txid,
            reason,
            value: refunded,
        },
        RegistrationOutcome::DustAbsorbed { btc_txid, value } => {
            BridgeEvent::DustAbsorbed { btc_txid, value }
        }
        RegistrationOutcome::DustUntracked { btc_txid, value } => {
            BridgeEvent::DustUntracked { btc_txid, value }
        }
        RegistrationOutcome::FederationSpend { btc_txid, outputs } => {
            BridgeEvent::FederationSpendRegistered { btc_txid, outputs }
        }
    }
}

/// A registration call as it appears in a sidechain block.
#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub tx: SidechainTx,
    pub raw_tx: Vec<u8>,
    pub btc_height: BtcHeight,
    pub pmt: Vec<u8>,
}

/// Applies a block's registrations in order.
///
/// Work happens on copies of `storage` and `ledger` which replace the
/// originals only if no registration hit a consensus-fatal error. Events are
/// forwarded to `events` on commit. Per-transaction failures that are not
/// fatal are returned alongside the successes.
///
/// # Errors
///
/// The first consensus-fatal [`RegistrationError`]. Nothing is committed.
pub fn process_block_registrations<S, L, E, B, P>(
    env: &BridgeEnv<'_, B, P>,
    height: SidechainHeight,
    storage: &mut S,
    ledger: &mut L,
    events: &mut E,
    requests: &[RegistrationRequest],
) -> Result<Vec<Result<RegistrationOutcome, RegistrationError>>, RegistrationError>
where
    S: BridgeStorage + Clone,
    L: NativeLedger + Clone,
    E: BridgeEventLogger + ?Sized,
    B: BtcBlockStore + ?Sized,
    P: LockSenderProvider + ?Sized,
{
    let mut staged_storage = storage.clone();
    let mut staged_ledger = ledger.clone();
    let mut recorder = RecordingEventLogger::new();

    let mut results = Vec::with_capacity(requests.len());
    {
        let mut support = BridgeSupport::new(
            env,
            height,
            &mut staged_storage,
            &mut staged_ledger,
            &mut recorder,
        );
        for req in requests {
            match support.register_btc_transaction(&req.tx, &req.raw_tx, req.btc_height, &req.pmt) {
                Err(e) if e.is_consensus_fatal() => {
                    error!(%height, %e, "aborting block registrations");
                    return Err(e);
                }
                res => results.push(res),
            }
        }
    }

    *storage = staged_storage;
    *ledger = staged_ledger;
    for event in recorder.into_events() {
        emit(events, event);
    }
    Ok(results)
}
