//! Native balances on the sidechain.

use std::collections::BTreeMap;

use strata_peg_primitives::{NativeAmount, SidechainAddress};
use tracing::*;

use crate::{LedgerError, LedgerResult};

/// Balance book of the sidechain's native asset.
pub trait NativeLedger {
    fn balance(&self, account: &SidechainAddress) -> NativeAmount;

    /// Moves `amount` from `from` to `to`. Nothing changes on failure.
    fn transfer(
        &mut self,
        from: &SidechainAddress,
        to: &SidechainAddress,
        amount: NativeAmount,
    ) -> LedgerResult<()>;
}

/// [`NativeLedger`] kept in memory. Absent accounts hold zero.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InMemoryLedger {
    balances: BTreeMap<SidechainAddress, NativeAmount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, account: SidechainAddress, amount: NativeAmount) -> Self {
        self.set_balance(account, amount);
        self
    }

    pub fn set_balance(&mut self, account: SidechainAddress, amount: NativeAmount) {
        self.balances.insert(account, amount);
    }
}

impl NativeLedger for InMemoryLedger {
    fn balance(&self, account: &SidechainAddress) -> NativeAmount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: &SidechainAddress,
        to: &SidechainAddress,
        amount: NativeAmount,
    ) -> LedgerResult<()> {
        let debited = self
            .balance(from)
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { account: *from })?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .balance(to)
            .try_add_within_supply(amount)
            .map_err(|source| LedgerError::Amount {
                account: *to,
                source,
            })?;

        trace!(%from, %to, ?amount, "native transfer");
        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_peg_primitives::BitcoinAmount;

    use super::*;

    fn addr(n: u8) -> SidechainAddress {
        SidechainAddress::new([n; 20])
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = InMemoryLedger::new().with_balance(addr(1), NativeAmount::from_units(100));
        ledger
            .transfer(&addr(1), &addr(2), NativeAmount::from_units(40))
            .unwrap();
        assert_eq!(ledger.balance(&addr(1)), NativeAmount::from_units(60));
        assert_eq!(ledger.balance(&addr(2)), NativeAmount::from_units(40));
    }

    #[test]
    fn test_insufficient_balance_changes_nothing() {
        let mut ledger = InMemoryLedger::new().with_balance(addr(1), NativeAmount::from_units(10));
        let err = ledger
            .transfer(&addr(1), &addr(2), NativeAmount::from_units(11))
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance { account: addr(1) });
        assert_eq!(ledger.balance(&addr(1)), NativeAmount::from_units(10));
        assert_eq!(ledger.balance(&addr(2)), NativeAmount::ZERO);
    }

    #[test]
    fn test_credit_above_supply_rejected() {
        let mut ledger = InMemoryLedger::new()
            .with_balance(addr(1), NativeAmount::from_btc(BitcoinAmount::from_int_btc(1)))
            .with_balance(addr(2), NativeAmount::MAX_SUPPLY);
        let err = ledger
            .transfer(&addr(1), &addr(2), NativeAmount::from_btc(BitcoinAmount::ONE_SAT))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Amount { account, .. } if account == addr(2)));
    }
}
