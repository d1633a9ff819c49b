use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use strata_peg_primitives::{BitcoinAmount, BtcHeight};

/// Output owned by a federation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationUtxo {
    outpoint: OutPoint,
    value: BitcoinAmount,
    /// Height of the bitcoin block that confirmed the output.
    height: BtcHeight,
    /// The creating transaction carries witness data.
    is_segwit: bool,
    /// Script that has to be satisfied to spend the output.
    redeem_script: ScriptBuf,
}

impl FederationUtxo {
    pub fn new(
        outpoint: OutPoint,
        value: BitcoinAmount,
        height: BtcHeight,
        is_segwit: bool,
        redeem_script: ScriptBuf,
    ) -> Self {
        Self {
            outpoint,
            value,
            height,
            is_segwit,
            redeem_script,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        self.outpoint
    }

    pub fn txid(&self) -> Txid {
        self.outpoint.txid
    }

    pub fn vout(&self) -> u32 {
        self.outpoint.vout
    }

    pub fn value(&self) -> BitcoinAmount {
        self.value
    }

    pub fn height(&self) -> BtcHeight {
        self.height
    }

    pub fn is_segwit(&self) -> bool {
        self.is_segwit
    }

    pub fn redeem_script(&self) -> &ScriptBuf {
        &self.redeem_script
    }
}
