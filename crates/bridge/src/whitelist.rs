//! Per-address permission to peg in.

use std::collections::BTreeMap;

use bitcoin::{Script, ScriptBuf};
use serde::{Deserialize, Serialize};
use strata_peg_primitives::{BitcoinAmount, SidechainHeight};

/// Permission granted to one bitcoin address.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WhitelistEntry {
    /// A single deposit of at most `max_value`, consumed on first use.
    OneOff { max_value: BitcoinAmount },

    /// Any number of deposits of any size.
    Unlimited,
}

/// Addresses allowed to peg in, keyed by their output script.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LockWhitelist {
    entries: BTreeMap<ScriptBuf, WhitelistEntry>,

    /// From this sidechain height on, every address is allowed.
    disable_block: Option<SidechainHeight>,
}

impl LockWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, script: &Script) -> Option<&WhitelistEntry> {
        self.entries.get(script)
    }

    pub fn disable_block(&self) -> Option<SidechainHeight> {
        self.disable_block
    }

    pub fn is_disabled_at(&self, height: SidechainHeight) -> bool {
        self.disable_block.is_some_and(|b| height >= b)
    }

    /// Whether the address has an entry at all.
    pub fn is_whitelisted(&self, script: &Script) -> bool {
        self.entries.contains_key(script)
    }

    /// Whether a deposit of `amount` from the address may be locked at `height`.
    pub fn is_whitelisted_for(
        &self,
        script: &Script,
        amount: BitcoinAmount,
        height: SidechainHeight,
    ) -> bool {
        if self.is_disabled_at(height) {
            return true;
        }
        match self.entries.get(script) {
            Some(WhitelistEntry::OneOff { max_value }) => amount <= *max_value,
            Some(WhitelistEntry::Unlimited) => true,
            None => false,
        }
    }

    /// Uses up the address's entry if it is one-off. Returns whether an entry
    /// was removed.
    pub fn consume(&mut self, script: &Script) -> bool {
        match self.entries.get(script) {
            Some(WhitelistEntry::OneOff { .. }) => self.entries.remove(script).is_some(),
            _ => false,
        }
    }

    /// Adds an entry. Returns `false` without change if the address is present.
    pub fn put(&mut self, script: ScriptBuf, entry: WhitelistEntry) -> bool {
        if self.entries.contains_key(&script) {
            return false;
        }
        self.entries.insert(script, entry);
        true
    }

    pub fn remove(&mut self, script: &Script) -> bool {
        self.entries.remove(script).is_some()
    }

    /// Sets the disable height once. Returns `false` if already set.
    pub fn set_disable_block(&mut self, height: SidechainHeight) -> bool {
        if self.disable_block.is_some() {
            return false;
        }
        self.disable_block = Some(height);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(n: u8) -> ScriptBuf {
        ScriptBuf::from_bytes(vec![n; 23])
    }

    #[test]
    fn test_one_off_consumed_once() {
        let mut wl = LockWhitelist::new();
        assert!(wl.put(
            script(1),
            WhitelistEntry::OneOff {
                max_value: BitcoinAmount::from_int_btc(5)
            }
        ));
        assert!(!wl.put(script(1), WhitelistEntry::Unlimited));

        assert!(wl.is_whitelisted_for(&script(1), BitcoinAmount::from_int_btc(5), 0));
        assert!(!wl.is_whitelisted_for(&script(1), BitcoinAmount::from_int_btc(6), 0));

        assert!(wl.consume(&script(1)));
        assert!(!wl.is_whitelisted(&script(1)));
        assert!(!wl.consume(&script(1)));
    }

    #[test]
    fn test_unlimited_not_consumed() {
        let mut wl = LockWhitelist::new();
        wl.put(script(2), WhitelistEntry::Unlimited);
        assert!(!wl.consume(&script(2)));
        assert!(wl.is_whitelisted_for(&script(2), BitcoinAmount::MAX_MONEY, 0));
        assert!(wl.remove(&script(2)));
        assert!(wl.is_empty());
    }

    #[test]
    fn test_disable_block() {
        let mut wl = LockWhitelist::new();
        assert!(!wl.is_whitelisted_for(&script(3), BitcoinAmount::ONE_SAT, 100));
        assert!(wl.set_disable_block(100));
        assert!(!wl.set_disable_block(50));
        assert!(!wl.is_whitelisted_for(&script(3), BitcoinAmount::ONE_SAT, 99));
        assert!(wl.is_whitelisted_for(&script(3), BitcoinAmount::ONE_SAT, 100));
    }
}
