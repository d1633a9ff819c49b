//! Serde helper modules for types that read better as strings in config files.

use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};
use strata_peg_primitives::SidechainAddress;

/// Serialize/deserialize a list of [`SidechainAddress`] as `0x`-prefixed hex strings.
pub mod serde_address_list {
    use super::*;

    pub fn serialize<S: Serializer>(v: &[SidechainAddress], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for addr in v {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SidechainAddress>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|s| {
                s.parse::<SidechainAddress>()
                    .map_err(|e| D::Error::custom(format!("invalid address {s}: {e}")))
            })
            .collect()
    }
}
