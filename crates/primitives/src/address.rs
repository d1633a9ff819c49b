use std::{fmt, str::FromStr};

use alloy_primitives::keccak256;
use arbitrary::Arbitrary;
use bitcoin::secp256k1::PublicKey;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 20-byte account address on the sidechain.
///
/// Derived from a secp256k1 key as the last 20 bytes of the keccak256 digest of
/// the uncompressed public key without its `0x04` prefix, so the same key that
/// signs a bitcoin deposit controls the credited sidechain account.
#[derive(
    Copy,
    Clone,
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
pub struct SidechainAddress([u8; 20]);

impl SidechainAddress {
    pub const LEN: usize = 20;

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derives the address controlled by `pubkey`.
    pub fn from_public_key(pubkey: &PublicKey) -> Self {
        let uncompressed = pubkey.serialize_uncompressed();
        let digest = keccak256(&uncompressed[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }
}

impl From<[u8; 20]> for SidechainAddress {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl fmt::Display for SidechainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SidechainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SidechainAddress({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for SidechainAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    use super::*;

    #[test]
    fn test_address_from_known_key() {
        // Secret key 1 maps to the well known account 0x7e5f...bdf.
        let secp = Secp256k1::new();
        let mut sk_bytes = [0u8; 32];
        sk_bytes[31] = 1;
        let sk = SecretKey::from_slice(&sk_bytes).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk);

        let addr = SidechainAddress::from_public_key(&pk);
        assert_eq!(
            addr.to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_parse_display() {
        let addr: SidechainAddress = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
            .parse()
            .unwrap();
        assert_eq!(
            addr.to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        assert_eq!(
            "0xdead".parse::<SidechainAddress>(),
            Err(AddressParseError::InvalidLength(2))
        );
        assert!("zz".parse::<SidechainAddress>().is_err());
    }
}
