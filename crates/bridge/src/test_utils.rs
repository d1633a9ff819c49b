//! Fixtures for bridge tests: keys, federations, deposit transactions and a
//! header chain that can prove their inclusion.

use bitcoin::{
    Address, BlockHash, CompactTarget, Network, OutPoint, PublicKey, Script, ScriptBuf, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
    absolute::LockTime,
    block::{Header, Version as BlockVersion},
    consensus,
    hashes::Hash,
    merkle_tree::PartialMerkleTree,
    script::{Builder, PushBytesBuf},
    secp256k1::{Secp256k1, SecretKey},
    transaction::Version,
};
use strata_peg_btc_verification::InMemoryBlockStore;
use strata_peg_primitives::{BitcoinAmount, BtcHeight};

use crate::{Federation, multisig_redeem_script};

/// Deterministic, always valid secret key.
pub fn secret_key(seed: u8) -> SecretKey {
    let mut bytes = [0x11u8; 32];
    bytes[31] = seed;
    SecretKey::from_slice(&bytes).expect("valid secret key")
}

pub fn sender_pubkey(sk: &SecretKey) -> PublicKey {
    PublicKey::new(sk.public_key(&Secp256k1::new()))
}

pub fn p2pkh_address(sk: &SecretKey, network: Network) -> Address {
    Address::p2pkh(sender_pubkey(sk).pubkey_hash(), network)
}

/// `n` distinct public keys derived from consecutive seeds.
pub fn pubkeys(seed: u8, n: usize) -> Vec<PublicKey> {
    (0..n)
        .map(|i| sender_pubkey(&secret_key(seed.wrapping_add(i as u8))))
        .collect()
}

/// A federation of `n` members and the members' secret keys.
pub fn test_federation(seed: u8, n: usize, network: Network) -> (Federation, Vec<SecretKey>) {
    let sks: Vec<_> = (0..n).map(|i| secret_key(seed.wrapping_add(i as u8))).collect();
    let members = sks.iter().map(sender_pubkey).collect();
    let fed = Federation::try_new(members, 1_000, 1, network).expect("valid federation");
    (fed, sks)
}

fn dummy_signature() -> PushBytesBuf {
    PushBytesBuf::try_from(vec![0x30; 71]).expect("small push")
}

fn push_bytes(bytes: Vec<u8>) -> PushBytesBuf {
    PushBytesBuf::try_from(bytes).expect("small push")
}

/// Script sig spending a P2SH multisig output: `OP_0 <sig>... <redeem>`.
pub fn redeem_push_script_sig(redeem: &Script, nsigs: usize) -> ScriptBuf {
    let mut builder = Builder::new().push_int(0);
    for _ in 0..nsigs {
        builder = builder.push_slice(dummy_signature());
    }
    builder.push_slice(push_bytes(redeem.to_bytes())).into_script()
}

fn deposit(
    prev: [u8; 32],
    script_sig: ScriptBuf,
    witness: Witness,
    outputs: &[(ScriptBuf, BitcoinAmount)],
) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array(prev), 0),
            script_sig,
            sequence: Sequence::MAX,
            witness,
        }],
        output: outputs
            .iter()
            .map(|(spk, value)| TxOut {
                value: (*value).into(),
                script_pubkey: spk.clone(),
            })
            .collect(),
    }
}

/// Deposit whose first input is a plain `<sig> <pubkey>` spend.
pub fn p2pkh_deposit(sk: &SecretKey, outputs: &[(ScriptBuf, BitcoinAmount)]) -> Transaction {
    let pk = sender_pubkey(sk);
    let script_sig = Builder::new()
        .push_slice(dummy_signature())
        .push_slice(push_bytes(pk.to_bytes()))
        .into_script();
    deposit(sk.secret_bytes(), script_sig, Witness::new(), outputs)
}

/// Deposit spending a P2WPKH output nested in P2SH.
pub fn p2sh_p2wpkh_deposit(sk: &SecretKey, outputs: &[(ScriptBuf, BitcoinAmount)]) -> Transaction {
    let pk = sender_pubkey(sk);
    let program = ScriptBuf::new_p2wpkh(&pk.wpubkey_hash().expect("compressed key"));
    let script_sig = Builder::new()
        .push_slice(push_bytes(program.to_bytes()))
        .into_script();
    let witness = Witness::from_slice(&[vec![0x30; 71], pk.to_bytes()]);
    deposit(sk.secret_bytes(), script_sig, witness, outputs)
}

/// Deposit spending a 2-of-3 P2SH multisig. Returns the redeem script too.
pub fn multisig_deposit(
    seed: u8,
    outputs: &[(ScriptBuf, BitcoinAmount)],
) -> (Transaction, ScriptBuf) {
    let redeem = multisig_redeem_script(2, &pubkeys(seed, 3));
    let script_sig = redeem_push_script_sig(&redeem, 2);
    (deposit([seed; 32], script_sig, Witness::new(), outputs), redeem)
}

/// Deposit spending a 2-of-3 P2WSH multisig nested in P2SH. Returns the
/// witness script too.
pub fn p2sh_p2wsh_multisig_deposit(
    seed: u8,
    outputs: &[(ScriptBuf, BitcoinAmount)],
) -> (Transaction, ScriptBuf) {
    let witness_script = multisig_redeem_script(2, &pubkeys(seed, 3));
    let program = ScriptBuf::new_p2wsh(&witness_script.wscript_hash());
    let script_sig = Builder::new()
        .push_slice(push_bytes(program.to_bytes()))
        .into_script();
    let witness = Witness::from_slice(&[
        Vec::new(),
        vec![0x30; 71],
        vec![0x30; 71],
        witness_script.to_bytes(),
    ]);
    (deposit([seed; 32], script_sig, witness, outputs), witness_script)
}

/// Header chain whose blocks can carry proofs for chosen transactions.
#[derive(Debug, Clone)]
pub struct TestChain {
    store: InMemoryBlockStore,
    nonce: u32,
}

impl TestChain {
    pub fn new(base_height: BtcHeight) -> Self {
        Self {
            store: InMemoryBlockStore::new(base_height),
            nonce: 0,
        }
    }

    pub fn store(&self) -> &InMemoryBlockStore {
        &self.store
    }

    fn push(&mut self, merkle_root: TxMerkleNode) -> BtcHeight {
        self.nonce += 1;
        self.store.push(Header {
            version: BlockVersion::ONE,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root,
            time: 1_700_000_000 + self.nonce,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: self.nonce,
        })
    }

    pub fn mine_empty(&mut self, blocks: u32) {
        for _ in 0..blocks {
            self.push(TxMerkleNode::all_zeros());
        }
    }

    /// Mines a block holding `tx` among a few filler transactions, then
    /// buries it to `confirmations`. Returns the block's height and the
    /// serialized partial merkle tree proving `tx`.
    pub fn confirm(&mut self, tx: &Transaction, confirmations: u32) -> (BtcHeight, Vec<u8>) {
        let mut txids: Vec<Txid> = (0..4u8)
            .map(|i| {
                let mut filler = [0xEEu8; 32];
                filler[0] = self.nonce as u8;
                filler[1] = i;
                Txid::from_byte_array(filler)
            })
            .collect();
        txids.insert(2, tx.compute_txid());
        let matches: Vec<bool> = txids.iter().map(|t| *t == tx.compute_txid()).collect();

        let pmt = PartialMerkleTree::from_txids(&txids, &matches);
        let root = pmt
            .extract_matches(&mut Vec::new(), &mut Vec::new())
            .expect("well-formed proof");

        let height = self.push(root);
        self.mine_empty(confirmations.saturating_sub(1));
        (height, consensus::serialize(&pmt))
    }
}
