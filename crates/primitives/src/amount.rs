use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::AmountError;

/// A wrapper for bitcoin amount in sats similar to the implementation in [`bitcoin::Amount`].
///
/// NOTE: This wrapper has been created so that we can implement `Borsh*` traits on it.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Arbitrary,
    BorshDeserialize,
    BorshSerialize,
    Deserialize,
    Serialize,
)]
pub struct BitcoinAmount(u64);

impl fmt::Display for BitcoinAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

impl From<bitcoin::Amount> for BitcoinAmount {
    fn from(value: bitcoin::Amount) -> Self {
        Self::from_sat(value.to_sat())
    }
}

impl From<BitcoinAmount> for bitcoin::Amount {
    fn from(value: BitcoinAmount) -> Self {
        Self::from_sat(value.to_sat())
    }
}

impl BitcoinAmount {
    /// The zero amount.
    pub const ZERO: BitcoinAmount = Self(0);

    /// One satoshi.
    pub const ONE_SAT: BitcoinAmount = Self(1);

    /// The maximum value allowed as an amount. Useful for sanity checking.
    pub const MAX_MONEY: BitcoinAmount = Self::from_int_btc(21_000_000);

    /// The number of sats in 1 bitcoin.
    pub const SATS_FACTOR: u64 = 100_000_000;

    /// Get the number of sats in this [`BitcoinAmount`].
    pub const fn to_sat(&self) -> u64 {
        self.0
    }

    /// Create a [`BitcoinAmount`] with sats precision and the given number of sats.
    pub const fn from_sat(value: u64) -> Self {
        Self(value)
    }

    /// Convert from a value of integer bitcoins to a [`BitcoinAmount`] in const context.
    ///
    /// ## Panics
    ///
    /// The function panics if the argument multiplied by the number of sats
    /// per bitcoin overflows a u64 type.
    pub const fn from_int_btc(btc: u64) -> Self {
        match btc.checked_mul(Self::SATS_FACTOR) {
            Some(amount) => Self::from_sat(amount),
            None => {
                panic!("number of sats greater than u64::MAX");
            }
        }
    }

    /// Checked addition. Returns [`None`] if overflow occurred.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self::from_sat)
    }

    /// Checked subtraction. Returns [`None`] if overflow occurred.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self::from_sat)
    }

    /// Checked multiplication. Returns [`None`] if overflow occurred.
    pub fn checked_mul(self, rhs: u64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self::from_sat)
    }

    /// Checked division. Returns [`None`] if `rhs == 0`.
    pub fn checked_div(self, rhs: u64) -> Option<Self> {
        self.0.checked_div(rhs).map(Self::from_sat)
    }

    /// Addition that reports overflow as an [`AmountError`].
    pub fn try_add(self, rhs: Self) -> Result<Self, AmountError> {
        self.checked_add(rhs).ok_or(AmountError::Overflow)
    }

    /// Subtraction that reports underflow as an [`AmountError`].
    pub fn try_sub(self, rhs: Self) -> Result<Self, AmountError> {
        self.checked_sub(rhs).ok_or(AmountError::Underflow)
    }

    /// Multiplication that reports overflow as an [`AmountError`].
    pub fn try_mul(self, rhs: u64) -> Result<Self, AmountError> {
        self.checked_mul(rhs).ok_or(AmountError::Overflow)
    }

    /// Saturating subtraction. Computes `self - rhs`, returning [`Self::ZERO`] if overflow
    /// occurred.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self::from_sat(self.to_sat().saturating_sub(rhs.to_sat()))
    }

    /// Sums amounts, failing on the first overflow.
    pub fn try_sum<I>(amounts: I) -> Result<Self, AmountError>
    where
        I: IntoIterator<Item = BitcoinAmount>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amt| acc.try_add(amt))
    }
}

/// Amount in the sidechain's native unit.
///
/// The native unit has 18 decimals while bitcoin has 8, so one satoshi is
/// worth [`NativeAmount::UNITS_PER_SAT`] native units. The full bitcoin
/// supply expressed in native units does not fit in 64 bits, hence `u128`.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Arbitrary,
    BorshDeserialize,
    BorshSerialize,
    Deserialize,
    Serialize,
)]
pub struct NativeAmount(u128);

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NativeAmount {
    pub const ZERO: NativeAmount = Self(0);

    /// Native units per satoshi.
    pub const UNITS_PER_SAT: u128 = 10_000_000_000;

    /// The full 21M coin supply in native units.
    pub const MAX_SUPPLY: NativeAmount =
        Self(BitcoinAmount::MAX_MONEY.to_sat() as u128 * Self::UNITS_PER_SAT);

    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn to_units(&self) -> u128 {
        self.0
    }

    /// Converts a bitcoin amount to native units.
    ///
    /// Cannot overflow: `u64::MAX * 10^10` is well inside `u128`.
    pub const fn from_btc(amount: BitcoinAmount) -> Self {
        Self(amount.to_sat() as u128 * Self::UNITS_PER_SAT)
    }

    /// Converts to bitcoin, rounding down to the satoshi.
    pub fn to_btc_floor(&self) -> Result<BitcoinAmount, AmountError> {
        let sats = self.0 / Self::UNITS_PER_SAT;
        u64::try_from(sats)
            .map(BitcoinAmount::from_sat)
            .map_err(|_| AmountError::Overflow)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn try_add(self, rhs: Self) -> Result<Self, AmountError> {
        self.checked_add(rhs).ok_or(AmountError::Overflow)
    }

    pub fn try_sub(self, rhs: Self) -> Result<Self, AmountError> {
        self.checked_sub(rhs).ok_or(AmountError::Underflow)
    }

    /// Addition bounded by [`Self::MAX_SUPPLY`].
    pub fn try_add_within_supply(self, rhs: Self) -> Result<Self, AmountError> {
        let sum = self.try_add(rhs)?;
        if sum > Self::MAX_SUPPLY {
            return Err(AmountError::AboveMaxSupply(sum.0));
        }
        Ok(sum)
    }
}

impl From<BitcoinAmount> for NativeAmount {
    fn from(value: BitcoinAmount) -> Self {
        Self::from_btc(value)
    }
}
