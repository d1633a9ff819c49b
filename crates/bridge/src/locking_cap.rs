//! Locking cap bookkeeping and the lock-or-refund decision.

use bitcoin::Script;
use strata_peg_params::{Activations, BridgeParams, ConsensusRule};
use strata_peg_primitives::{BitcoinAmount, NativeAmount, SidechainHeight, SidechainTx};
use tracing::*;

use crate::{Authorizer, BridgeStorage, LockWhitelist, StorageResult};

/// Reads the locking cap, installing the configured initial cap on first use.
pub fn get_or_init_locking_cap<S: BridgeStorage + ?Sized>(
    storage: &mut S,
    params: &BridgeParams,
) -> StorageResult<BitcoinAmount> {
    if let Some(cap) = storage.locking_cap()? {
        return Ok(cap);
    }
    let cap = params.initial_locking_cap;
    info!(%cap, "initializing locking cap");
    storage.set_locking_cap(cap)?;
    Ok(cap)
}

/// Result of a locking cap increase request. Only `Applied` changes state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CapIncreaseOutcome {
    Applied {
        from: BitcoinAmount,
        to: BitcoinAmount,
    },
    Unauthorized,
    BelowCurrent,
    AboveMultiplier,
}

impl CapIncreaseOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Raises the locking cap to `proposed` if `tx`'s sender may do so and
/// `current <= proposed <= current * multiplier`.
pub fn increase_locking_cap<S, A>(
    storage: &mut S,
    params: &BridgeParams,
    authorizer: &A,
    tx: &SidechainTx,
    proposed: BitcoinAmount,
) -> StorageResult<CapIncreaseOutcome>
where
    S: BridgeStorage + ?Sized,
    A: Authorizer + ?Sized,
{
    if !authorizer.is_authorized(tx) {
        warn!(sender = %tx.sender(), "unauthorized locking cap increase");
        return Ok(CapIncreaseOutcome::Unauthorized);
    }

    let current = get_or_init_locking_cap(storage, params)?;
    if proposed < current {
        return Ok(CapIncreaseOutcome::BelowCurrent);
    }

    let limit = current
        .checked_mul(params.locking_cap_increments_multiplier)
        .unwrap_or(BitcoinAmount::from_sat(u64::MAX));
    if proposed > limit {
        return Ok(CapIncreaseOutcome::AboveMultiplier);
    }

    storage.set_locking_cap(proposed)?;
    info!(from = %current, to = %proposed, "locking cap increased");
    Ok(CapIncreaseOutcome::Applied {
        from: current,
        to: proposed,
    })
}

/// Why a deposit is sent back instead of credited.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RefundReason {
    /// Sender has no usable whitelist entry for the amount.
    NotWhitelisted,

    /// Crediting would take custody above the locking cap.
    LockingCapExceeded,

    /// No sidechain account could be derived from the sender.
    NoSidechainDestination,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockDecision {
    Lock,
    Refund(RefundReason),
}

impl LockDecision {
    pub fn is_lock(&self) -> bool {
        matches!(self, Self::Lock)
    }
}

/// Everything [`evaluate_lock`] reads besides the whitelist.
#[derive(Copy, Clone, Debug)]
pub struct LockContext {
    pub activations: Activations,
    pub height: SidechainHeight,
    pub locking_cap: BitcoinAmount,

    /// Value currently held by both federations.
    pub custody: BitcoinAmount,
}

/// Decides whether a deposit of `amount` from `sender` is locked or refunded.
///
/// A matching one-off whitelist entry is consumed even when the locking cap
/// then refuses the deposit.
pub fn evaluate_lock(
    ctx: &LockContext,
    whitelist: &mut LockWhitelist,
    sender: &Script,
    amount: BitcoinAmount,
) -> LockDecision {
    if !whitelist.is_whitelisted_for(sender, amount, ctx.height) {
        debug!(%amount, "sender not whitelisted for amount");
        return LockDecision::Refund(RefundReason::NotWhitelisted);
    }
    if !whitelist.is_disabled_at(ctx.height) {
        whitelist.consume(sender);
    }

    if !ctx.activations.is_active(ConsensusRule::LockingCap) {
        return LockDecision::Lock;
    }

    let cap = NativeAmount::from_btc(ctx.locking_cap);
    let after = NativeAmount::from_btc(ctx.custody).checked_add(NativeAmount::from_btc(amount));
    match after {
        Some(total) if total <= cap => LockDecision::Lock,
        _ => {
            debug!(
                custody = %ctx.custody,
                %amount,
                cap = %ctx.locking_cap,
                "locking cap exceeded"
            );
            LockDecision::Refund(RefundReason::LockingCapExceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bitcoin::{Network, ScriptBuf};
    use strata_peg_primitives::SidechainAddress;

    use super::*;
    use crate::{
        AddressBasedAuthorizer, FederationFunds, InMemoryBridgeStorage, MockBridgeStorage,
        WhitelistEntry, test_utils::test_federation,
    };

    fn btc(n: u64) -> BitcoinAmount {
        BitcoinAmount::from_int_btc(n)
    }

    fn ctx(cap_active: bool, cap: u64, custody: u64) -> LockContext {
        LockContext {
            activations: Activations::new(cap_active, true),
            height: 10,
            locking_cap: btc(cap),
            custody: btc(custody),
        }
    }

    fn sender() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0x51])
    }

    fn unlimited() -> LockWhitelist {
        let mut wl = LockWhitelist::new();
        wl.put(sender(), WhitelistEntry::Unlimited);
        wl
    }

    #[test]
    fn test_cap_inactive_locks() {
        let mut wl = unlimited();
        assert_eq!(
            evaluate_lock(&ctx(false, 3, 0), &mut wl, &sender(), btc(5)),
            LockDecision::Lock
        );
    }

    #[test]
    fn test_cap_boundary() {
        let mut wl = unlimited();
        assert_eq!(
            evaluate_lock(&ctx(true, 3, 0), &mut wl, &sender(), btc(5)),
            LockDecision::Refund(RefundReason::LockingCapExceeded)
        );
        assert_eq!(evaluate_lock(&ctx(true, 3, 0), &mut wl, &sender(), btc(2)), LockDecision::Lock);
        assert_eq!(evaluate_lock(&ctx(true, 3, 1), &mut wl, &sender(), btc(2)), LockDecision::Lock);
        assert_eq!(
            evaluate_lock(&ctx(true, 3, 2), &mut wl, &sender(), btc(2)),
            LockDecision::Refund(RefundReason::LockingCapExceeded)
        );
    }

    #[test]
    fn test_one_off_consumed_even_when_refunded() {
        let mut wl = LockWhitelist::new();
        wl.put(sender(), WhitelistEntry::OneOff { max_value: btc(10) });

        let decision = evaluate_lock(&ctx(true, 3, 0), &mut wl, &sender(), btc(5));
        assert_eq!(decision, LockDecision::Refund(RefundReason::LockingCapExceeded));
        assert!(!wl.is_whitelisted(&sender()));

        // Second deposit finds no entry.
        let decision = evaluate_lock(&ctx(true, 30, 0), &mut wl, &sender(), btc(1));
        assert_eq!(decision, LockDecision::Refund(RefundReason::NotWhitelisted));
    }

    #[test]
    fn test_one_off_over_max_not_consumed() {
        let mut wl = LockWhitelist::new();
        wl.put(sender(), WhitelistEntry::OneOff { max_value: btc(1) });
        let decision = evaluate_lock(&ctx(false, 0, 0), &mut wl, &sender(), btc(2));
        assert_eq!(decision, LockDecision::Refund(RefundReason::NotWhitelisted));
        assert!(wl.is_whitelisted(&sender()));
    }

    #[test]
    fn test_disabled_whitelist_accepts_anyone() {
        let mut wl = LockWhitelist::new();
        wl.set_disable_block(5);
        assert_eq!(
            evaluate_lock(&ctx(false, 0, 0), &mut wl, &sender(), btc(2)),
            LockDecision::Lock
        );
    }

    fn storage() -> InMemoryBridgeStorage {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        InMemoryBridgeStorage::new(FederationFunds::new(fed))
    }

    fn cap_authorizer() -> AddressBasedAuthorizer {
        AddressBasedAuthorizer::new([SidechainAddress::new([1; 20])], 1)
    }

    fn tx(n: u8) -> SidechainTx {
        SidechainTx::new(SidechainAddress::new([n; 20]), [n; 32])
    }

    #[test]
    fn test_increase_bounds() {
        let params = BridgeParams::regtest();
        let initial = params.initial_locking_cap;
        let mut s = storage();
        let auth = cap_authorizer();

        let out = increase_locking_cap(&mut s, &params, &auth, &tx(2), initial).unwrap();
        assert_eq!(out, CapIncreaseOutcome::Unauthorized);
        assert_eq!(s.locking_cap().unwrap(), None);

        let below = initial.checked_sub(BitcoinAmount::ONE_SAT).unwrap();
        let out = increase_locking_cap(&mut s, &params, &auth, &tx(1), below).unwrap();
        assert_eq!(out, CapIncreaseOutcome::BelowCurrent);

        let limit = initial.checked_mul(params.locking_cap_increments_multiplier).unwrap();
        let above = limit.checked_add(BitcoinAmount::ONE_SAT).unwrap();
        let out = increase_locking_cap(&mut s, &params, &auth, &tx(1), above).unwrap();
        assert_eq!(out, CapIncreaseOutcome::AboveMultiplier);
        assert_eq!(s.locking_cap().unwrap(), Some(initial));

        let out = increase_locking_cap(&mut s, &params, &auth, &tx(1), limit).unwrap();
        assert_eq!(out, CapIncreaseOutcome::Applied { from: initial, to: limit });
        assert_eq!(s.locking_cap().unwrap(), Some(limit));
    }

    #[test]
    fn test_increase_to_same_value_applies() {
        let params = BridgeParams::regtest();
        let mut s = storage();
        let out = increase_locking_cap(
            &mut s,
            &params,
            &cap_authorizer(),
            &tx(1),
            params.initial_locking_cap,
        )
        .unwrap();
        assert!(out.is_applied());
    }

    #[test]
    fn test_cap_initialized_once() {
        let params = BridgeParams::regtest();
        let cell: Arc<Mutex<Option<BitcoinAmount>>> = Arc::new(Mutex::new(None));

        let mut mock = MockBridgeStorage::new();
        let read = cell.clone();
        mock.expect_locking_cap()
            .returning(move || Ok(*read.lock().unwrap()));
        let write = cell.clone();
        mock.expect_set_locking_cap().times(1).returning(move |cap| {
            *write.lock().unwrap() = Some(cap);
            Ok(())
        });

        let first = get_or_init_locking_cap(&mut mock, &params).unwrap();
        let second = get_or_init_locking_cap(&mut mock, &params).unwrap();
        assert_eq!(first, params.initial_locking_cap);
        assert_eq!(second, first);
    }
}
