//! Bitcoin transactions the federation still has to sign.

use std::{
    io::{self, Read, Write},
    slice,
};

use bitcoin::{
    Address, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    absolute::LockTime,
    consensus::{self, encode::VarInt},
    transaction::Version,
};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_peg_primitives::{BitcoinAmount, SidechainHeight};

use crate::{Federation, RefundError};

/// Outputs below this many sats are not relayed by bitcoin nodes.
pub const DUST_LIMIT: BitcoinAmount = BitcoinAmount::from_sat(546);

/// [Borsh](borsh)-friendly bitcoin [`Transaction`], stored in consensus
/// encoding so the txid survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTx(Transaction);

impl BitcoinTx {
    pub fn inner(&self) -> &Transaction {
        &self.0
    }

    pub fn compute_txid(&self) -> Txid {
        self.0.compute_txid()
    }
}

impl From<Transaction> for BitcoinTx {
    fn from(value: Transaction) -> Self {
        Self(value)
    }
}

impl From<BitcoinTx> for Transaction {
    fn from(value: BitcoinTx) -> Self {
        value.0
    }
}

impl BorshSerialize for BitcoinTx {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let raw = consensus::serialize(&self.0);
        BorshSerialize::serialize(&(raw.len() as u32), writer)?;
        writer.write_all(&raw)
    }
}

impl BorshDeserialize for BitcoinTx {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let len = u32::deserialize_reader(reader)? as usize;
        let mut raw = vec![0u8; len];
        reader.read_exact(&mut raw)?;
        let tx = consensus::deserialize(&raw)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid bitcoin tx"))?;
        Ok(Self(tx))
    }
}

/// A release awaiting federation signatures.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ReleaseEntry {
    tx: BitcoinTx,

    /// Sidechain height at which the release was queued.
    created_at: SidechainHeight,
}

impl ReleaseEntry {
    pub fn new(tx: Transaction, created_at: SidechainHeight) -> Self {
        Self {
            tx: tx.into(),
            created_at,
        }
    }

    pub fn tx(&self) -> &Transaction {
        self.tx.inner()
    }

    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    pub fn created_at(&self) -> SidechainHeight {
        self.created_at
    }
}

/// Pending releases, sorted by txid.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ReleaseTransactionSet {
    entries: Vec<ReleaseEntry>,
}

impl ReleaseTransactionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    fn entry_pos(&self, txid: &Txid) -> Result<usize, usize> {
        self.entries.binary_search_by_key(txid, |e| e.txid())
    }

    /// Does a binary search.
    pub fn get(&self, txid: &Txid) -> Option<&ReleaseEntry> {
        self.entry_pos(txid).ok().map(|i| &self.entries[i])
    }

    /// Inserts an entry. Returns `false` if a tx with the same txid is queued.
    pub fn add(&mut self, entry: ReleaseEntry) -> bool {
        match self.entry_pos(&entry.txid()) {
            Ok(_) => false,
            Err(pos) => {
                self.entries.insert(pos, entry);
                true
            }
        }
    }

    /// Removes a release once it is fully signed.
    pub fn remove(&mut self, txid: &Txid) -> Option<ReleaseEntry> {
        self.entry_pos(txid).ok().map(|i| self.entries.remove(i))
    }
}

/// A federation output spent by a release.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseInput<'a> {
    pub outpoint: OutPoint,
    pub value: BitcoinAmount,
    pub federation: &'a Federation,
}

/// Bytes needed by an opcode pushing `len` bytes of data.
fn push_size(len: usize) -> usize {
    match len {
        0..=75 => 1 + len,
        76..=255 => 2 + len,
        256..=65535 => 3 + len,
        _ => 5 + len,
    }
}

/// Size of a P2SH multisig input once fully signed.
fn multisig_input_size(federation: &Federation) -> usize {
    // OP_0, then one 72-byte DER signature plus sighash byte per signer.
    let script_sig = 1
        + federation.threshold() * push_size(72)
        + push_size(federation.redeem_script().len());
    // Outpoint and sequence.
    40 + VarInt(script_sig as u64).size() + script_sig
}

/// Serialized size of a signed release spending `inputs` to `outputs`.
pub fn estimate_release_size(inputs: &[ReleaseInput<'_>], outputs: &[ScriptBuf]) -> usize {
    // Version and lock time.
    let fixed = 8 + VarInt(inputs.len() as u64).size() + VarInt(outputs.len() as u64).size();
    let ins: usize = inputs.iter().map(|i| multisig_input_size(i.federation)).sum();
    let outs: usize = outputs
        .iter()
        .map(|spk| 8 + VarInt(spk.len() as u64).size() + spk.len())
        .sum();
    fixed + ins + outs
}

/// `ceil(fee_per_kb * size / 1000)`.
pub fn fee_for_size(fee_per_kb: BitcoinAmount, size: usize) -> Result<BitcoinAmount, RefundError> {
    let scaled = fee_per_kb.try_mul(size as u64)?;
    let sats = scaled.to_sat().div_ceil(1000);
    Ok(BitcoinAmount::from_sat(sats))
}

/// Builds the unsigned transaction returning every input to `destination`,
/// less the fee.
///
/// # Errors
///
/// [`RefundError::Dust`] if what is left after the fee is below
/// [`DUST_LIMIT`], [`RefundError::NoInputs`] for an empty input list.
pub fn build_refund_tx(
    inputs: &[ReleaseInput<'_>],
    destination: &Address,
    fee_per_kb: BitcoinAmount,
) -> Result<Transaction, RefundError> {
    if inputs.is_empty() {
        return Err(RefundError::NoInputs);
    }

    let total = BitcoinAmount::try_sum(inputs.iter().map(|i| i.value))?;
    let script_pubkey = destination.script_pubkey();
    let size = estimate_release_size(inputs, slice::from_ref(&script_pubkey));
    let fee = fee_for_size(fee_per_kb, size)?;

    let value = match total.checked_sub(fee) {
        Some(v) if v >= DUST_LIMIT => v,
        _ => return Err(RefundError::Dust { value: total, fee }),
    };

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|i| TxIn {
                previous_output: i.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: value.into(),
            script_pubkey,
        }],
    })
}

#[cfg(test)]
mod tests {
    use bitcoin::{Network, hashes::Hash};

    use super::*;
    use crate::test_utils::{p2pkh_address, secret_key, test_federation};

    fn inputs<'a>(fed: &'a Federation, sats: &[u64]) -> Vec<ReleaseInput<'a>> {
        sats.iter()
            .enumerate()
            .map(|(i, s)| ReleaseInput {
                outpoint: OutPoint::new(Txid::from_byte_array([9; 32]), i as u32),
                value: BitcoinAmount::from_sat(*s),
                federation: fed,
            })
            .collect()
    }

    #[test]
    fn test_fee_rounds_up() {
        let fee = |per_kb, size| {
            fee_for_size(BitcoinAmount::from_sat(per_kb), size)
                .unwrap()
                .to_sat()
        };
        assert_eq!(fee(1000, 250), 250);
        assert_eq!(fee(1, 1001), 2);
        assert_eq!(fee(10_000, 0), 0);
    }

    #[test]
    fn test_refund_spends_inputs_in_order() {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        let dest = p2pkh_address(&secret_key(3), Network::Regtest);
        let ins = inputs(&fed, &[300_000_000, 200_000_000]);
        let fee_per_kb = BitcoinAmount::from_sat(10_000);

        let tx = build_refund_tx(&ins, &dest, fee_per_kb).unwrap();

        assert_eq!(tx.version, Version::TWO);
        assert_eq!(tx.input.len(), 2);
        for (i, txin) in tx.input.iter().enumerate() {
            assert_eq!(txin.previous_output, ins[i].outpoint);
            assert_eq!(txin.sequence, Sequence::MAX);
        }
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].script_pubkey, dest.script_pubkey());

        let size = estimate_release_size(&ins, &[dest.script_pubkey()]);
        let fee = fee_for_size(fee_per_kb, size).unwrap();
        assert_eq!(tx.output[0].value.to_sat(), 500_000_000 - fee.to_sat());
        assert!(fee.to_sat() < 100_000);
    }

    #[test]
    fn test_dust_refund_rejected() {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        let dest = p2pkh_address(&secret_key(3), Network::Regtest);
        let err = build_refund_tx(&inputs(&fed, &[1_000]), &dest, BitcoinAmount::from_sat(50_000))
            .unwrap_err();
        assert!(matches!(err, RefundError::Dust { .. }));
        assert_eq!(
            build_refund_tx(&[], &dest, BitcoinAmount::from_sat(1)).unwrap_err(),
            RefundError::NoInputs
        );
    }

    #[test]
    fn test_release_set_sorted_and_unique() {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        let dest = p2pkh_address(&secret_key(3), Network::Regtest);
        let fee = BitcoinAmount::from_sat(1_000);

        let mut set = ReleaseTransactionSet::new();
        let mut txids = Vec::new();
        for n in 0..4u64 {
            let tx = build_refund_tx(&inputs(&fed, &[1_000_000 + n]), &dest, fee).unwrap();
            txids.push(tx.compute_txid());
            assert!(set.add(ReleaseEntry::new(tx.clone(), n)));
            assert!(!set.add(ReleaseEntry::new(tx, n + 1)));
        }
        assert_eq!(set.len(), 4);
        assert!(set.entries().windows(2).all(|w| w[0].txid() < w[1].txid()));

        assert_eq!(set.get(&txids[2]).map(|e| e.created_at()), Some(2));
        assert!(set.remove(&txids[2]).is_some());
        assert!(set.get(&txids[2]).is_none());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_release_entry_borsh_keeps_txid() {
        let (fed, _) = test_federation(1, 3, Network::Regtest);
        let dest = p2pkh_address(&secret_key(3), Network::Regtest);
        let tx = build_refund_tx(&inputs(&fed, &[2_000_000]), &dest, BitcoinAmount::from_sat(1_000))
            .unwrap();
        let entry = ReleaseEntry::new(tx, 7);

        let bytes = borsh::to_vec(&entry).unwrap();
        let decoded: ReleaseEntry = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded.txid(), entry.txid());
        assert_eq!(decoded, entry);
    }
}
