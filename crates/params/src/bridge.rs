use std::{fs, path::Path};

use bitcoin::Network;
use serde::{Deserialize, Serialize};
use strata_peg_primitives::{BitcoinAmount, SidechainAddress};

use crate::{ActivationConfig, AuthorizerConfig, AuthorizerPolicy, ParamsError};

/// Consensus parameters of the peg for one network.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BridgeParams {
    /// Bitcoin network the federation addresses live on.
    pub network: Network,

    /// Confirmations a deposit's block needs before it may be registered.
    #[serde(default = "default_min_btc_confirmations")]
    pub min_btc_confirmations: u32,

    /// Smallest total deposit that is accepted at all.
    #[serde(default = "default_min_lock_value")]
    pub min_lock_value: BitcoinAmount,

    /// Locking cap installed on first read.
    pub initial_locking_cap: BitcoinAmount,

    /// A cap increase may at most multiply the current cap by this factor.
    #[serde(default = "default_locking_cap_increments_multiplier")]
    pub locking_cap_increments_multiplier: u64,

    /// Fee rate used for refunds until governance votes a new one.
    #[serde(default = "default_genesis_fee_per_kb")]
    pub genesis_fee_per_kb: BitcoinAmount,

    /// Largest fee rate a vote may propose.
    #[serde(default = "default_max_fee_per_kb")]
    pub max_fee_per_kb: BitcoinAmount,

    pub fee_per_kb_authorizer: AuthorizerConfig,
    pub locking_cap_authorizer: AuthorizerConfig,
    pub lock_whitelist_authorizer: AuthorizerConfig,

    #[serde(default)]
    pub activations: ActivationConfig,
}

fn default_min_btc_confirmations() -> u32 {
    100
}

fn default_min_lock_value() -> BitcoinAmount {
    BitcoinAmount::from_sat(1_000_000)
}

fn default_locking_cap_increments_multiplier() -> u64 {
    2
}

fn default_genesis_fee_per_kb() -> BitcoinAmount {
    BitcoinAmount::from_sat(50_000)
}

fn default_max_fee_per_kb() -> BitcoinAmount {
    BitcoinAmount::from_sat(5_000_000)
}

fn preset_authorizer(seed: u8, count: u8, policy: AuthorizerPolicy) -> AuthorizerConfig {
    let members = (0..count)
        .map(|i| SidechainAddress::new([seed.wrapping_add(i); 20]))
        .collect();
    AuthorizerConfig::new_unchecked(members, policy)
}

impl BridgeParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Bitcoin,
            min_btc_confirmations: default_min_btc_confirmations(),
            min_lock_value: default_min_lock_value(),
            initial_locking_cap: BitcoinAmount::from_int_btc(300),
            locking_cap_increments_multiplier: default_locking_cap_increments_multiplier(),
            genesis_fee_per_kb: default_genesis_fee_per_kb(),
            max_fee_per_kb: default_max_fee_per_kb(),
            fee_per_kb_authorizer: preset_authorizer(0x10, 3, AuthorizerPolicy::Majority),
            locking_cap_authorizer: preset_authorizer(0x20, 1, AuthorizerPolicy::One),
            lock_whitelist_authorizer: preset_authorizer(0x30, 1, AuthorizerPolicy::One),
            activations: ActivationConfig {
                locking_cap: Some(1_591_000),
                segwit_compatible_lock_senders: Some(1_591_000),
            },
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            min_btc_confirmations: 10,
            min_lock_value: BitcoinAmount::from_sat(1_000_000),
            initial_locking_cap: BitcoinAmount::from_int_btc(200),
            locking_cap_increments_multiplier: default_locking_cap_increments_multiplier(),
            genesis_fee_per_kb: BitcoinAmount::from_sat(10_000),
            max_fee_per_kb: default_max_fee_per_kb(),
            fee_per_kb_authorizer: preset_authorizer(0x40, 3, AuthorizerPolicy::Majority),
            locking_cap_authorizer: preset_authorizer(0x50, 1, AuthorizerPolicy::One),
            lock_whitelist_authorizer: preset_authorizer(0x60, 1, AuthorizerPolicy::One),
            activations: ActivationConfig {
                locking_cap: Some(1_180_000),
                segwit_compatible_lock_senders: Some(1_180_000),
            },
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            min_btc_confirmations: 3,
            min_lock_value: BitcoinAmount::from_sat(500_000),
            initial_locking_cap: BitcoinAmount::from_int_btc(1_000),
            locking_cap_increments_multiplier: default_locking_cap_increments_multiplier(),
            genesis_fee_per_kb: BitcoinAmount::from_sat(10_000),
            max_fee_per_kb: default_max_fee_per_kb(),
            fee_per_kb_authorizer: preset_authorizer(0x70, 3, AuthorizerPolicy::Majority),
            locking_cap_authorizer: preset_authorizer(0x80, 1, AuthorizerPolicy::One),
            lock_whitelist_authorizer: preset_authorizer(0x90, 1, AuthorizerPolicy::One),
            activations: ActivationConfig::all_active(),
        }
    }

    /// Preset for `network`. Signet shares the testnet values.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Bitcoin => Self::mainnet(),
            Network::Regtest => Self::regtest(),
            _ => Self {
                network,
                ..Self::testnet()
            },
        }
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.min_btc_confirmations == 0 {
            return Err(ParamsError::Invalid("min_btc_confirmations must be positive"));
        }
        if self.locking_cap_increments_multiplier == 0 {
            return Err(ParamsError::Invalid(
                "locking_cap_increments_multiplier must be positive",
            ));
        }
        if self.max_fee_per_kb == BitcoinAmount::ZERO {
            return Err(ParamsError::Invalid("max_fee_per_kb must be positive"));
        }
        if self.genesis_fee_per_kb > self.max_fee_per_kb {
            return Err(ParamsError::Invalid(
                "genesis_fee_per_kb exceeds max_fee_per_kb",
            ));
        }
        if self.initial_locking_cap > BitcoinAmount::MAX_MONEY {
            return Err(ParamsError::Invalid("initial_locking_cap exceeds supply"));
        }
        self.fee_per_kb_authorizer.validate("fee_per_kb")?;
        self.locking_cap_authorizer.validate("locking_cap")?;
        self.lock_whitelist_authorizer.validate("lock_whitelist")?;
        Ok(())
    }

    /// Parses and validates params from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ParamsError> {
        let params: Self = toml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Reads, parses and validates a TOML params file.
    pub fn load_from_path(path: &Path) -> Result<Self, ParamsError> {
        let raw = fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ConsensusRule;

    const REGTEST_TOML: &str = r#"
network = "regtest"
initial_locking_cap = 300000000

[fee_per_kb_authorizer]
members = [
    "0x0101010101010101010101010101010101010101",
    "0x0202020202020202020202020202020202020202",
]
policy = "all"

[locking_cap_authorizer]
members = ["0x0303030303030303030303030303030303030303"]
policy = "one"

[lock_whitelist_authorizer]
members = ["0x0404040404040404040404040404040404040404"]
policy = "one"

[activations]
locking_cap = 10
"#;

    #[test]
    fn test_presets_validate() {
        BridgeParams::mainnet().validate().unwrap();
        BridgeParams::testnet().validate().unwrap();
        BridgeParams::regtest().validate().unwrap();
        assert_eq!(
            BridgeParams::for_network(Network::Signet).network,
            Network::Signet
        );
    }

    #[test]
    fn test_from_toml_defaults() {
        let params = BridgeParams::from_toml_str(REGTEST_TOML).unwrap();
        assert_eq!(params.network, Network::Regtest);
        assert_eq!(params.initial_locking_cap, BitcoinAmount::from_int_btc(3));
        assert_eq!(params.min_btc_confirmations, 100);
        assert_eq!(params.locking_cap_increments_multiplier, 2);
        assert_eq!(params.max_fee_per_kb, BitcoinAmount::from_sat(5_000_000));
        assert_eq!(params.fee_per_kb_authorizer.required_votes(), 2);
        assert_eq!(params.activations.activation_height(ConsensusRule::LockingCap), Some(10));
        assert_eq!(
            params
                .activations
                .activation_height(ConsensusRule::SegwitCompatibleLockSenders),
            None
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let params = BridgeParams::testnet();
        let s = toml::to_string(&params).unwrap();
        assert_eq!(BridgeParams::from_toml_str(&s).unwrap(), params);
    }

    #[test]
    fn test_rejects_inconsistent() {
        let bad = REGTEST_TOML.replace(
            "initial_locking_cap = 300000000",
            "initial_locking_cap = 1\ngenesis_fee_per_kb = 9000000",
        );
        assert!(matches!(
            BridgeParams::from_toml_str(&bad),
            Err(ParamsError::Invalid(_))
        ));

        let bad_addr = REGTEST_TOML.replace("0x0303030303030303030303030303030303030303", "0x03");
        assert!(matches!(
            BridgeParams::from_toml_str(&bad_addr),
            Err(ParamsError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REGTEST_TOML.as_bytes()).unwrap();
        let params = BridgeParams::load_from_path(file.path()).unwrap();
        assert_eq!(params.network, Network::Regtest);

        let missing = BridgeParams::load_from_path(Path::new("/nonexistent/params.toml"));
        assert!(matches!(missing, Err(ParamsError::Io { .. })));
    }
}
