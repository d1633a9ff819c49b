//! Classification of who paid a deposit.

use bitcoin::{
    Address, Network, PublicKey, Script, ScriptBuf, Transaction,
    script::Instruction,
};
use strata_peg_primitives::SidechainAddress;
use tracing::*;

use crate::is_multisig_script;

/// Script template that redeemed the deposit's first input.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TxSenderType {
    P2pkh,
    P2shP2wpkh,
    P2shMultisig,
    P2shP2wshMultisig,
}

/// Originator of a deposit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockSender {
    tx_type: TxSenderType,
    btc_address: Address,
    sidechain_address: Option<SidechainAddress>,
}

impl LockSender {
    pub fn new(
        tx_type: TxSenderType,
        btc_address: Address,
        sidechain_address: Option<SidechainAddress>,
    ) -> Self {
        Self {
            tx_type,
            btc_address,
            sidechain_address,
        }
    }

    pub fn tx_type(&self) -> TxSenderType {
        self.tx_type
    }

    /// Address refunds are paid to.
    pub fn btc_address(&self) -> &Address {
        &self.btc_address
    }

    /// Account to credit, known only for single-key templates.
    pub fn sidechain_address(&self) -> Option<SidechainAddress> {
        self.sidechain_address
    }
}

/// Resolves the sender of a deposit transaction.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait LockSenderProvider {
    /// Returns `None` when the first input's template is not recognized.
    fn try_get(&self, tx: &Transaction, network: Network) -> Option<LockSender>;
}

/// Classifies senders by inspecting the first input's script sig and witness.
#[derive(Copy, Clone, Debug, Default)]
pub struct ScriptLockSenderProvider;

impl LockSenderProvider for ScriptLockSenderProvider {
    fn try_get(&self, tx: &Transaction, network: Network) -> Option<LockSender> {
        let input = tx.input.first()?;
        let pushes = push_data(&input.script_sig)?;
        let witness: Vec<&[u8]> = input.witness.iter().collect();

        if witness.is_empty() {
            if let [_sig, key] = pushes.as_slice()
                && let Ok(pubkey) = PublicKey::from_slice(key)
            {
                return Some(single_key_sender(TxSenderType::P2pkh, &pubkey, network));
            }

            let redeem = ScriptBuf::from_bytes(pushes.last()?.to_vec());
            if pushes.len() >= 2 && is_multisig_script(&redeem) {
                return p2sh_sender(TxSenderType::P2shMultisig, &redeem, network);
            }
            return None;
        }

        // Segwit nested in P2SH: the script sig is a single push of the witness program.
        let [program] = pushes.as_slice() else {
            return None;
        };
        let redeem = ScriptBuf::from_bytes(program.to_vec());

        if redeem.is_p2wpkh() {
            let [_sig, key] = witness.as_slice() else {
                return None;
            };
            let pubkey = PublicKey::from_slice(key).ok()?;
            let sidechain = SidechainAddress::from_public_key(&pubkey.inner);
            let address = Address::p2sh(&redeem, network).ok()?;
            return Some(LockSender::new(
                TxSenderType::P2shP2wpkh,
                address,
                Some(sidechain),
            ));
        }

        if redeem.is_p2wsh() {
            let witness_script = Script::from_bytes(witness.last()?);
            if witness.len() >= 2 && is_multisig_script(witness_script) {
                return p2sh_sender(TxSenderType::P2shP2wshMultisig, &redeem, network);
            }
        }

        None
    }
}

/// Recovers a refund address from a plain `<sig> <pubkey>` script sig, when
/// no richer classification succeeded. No sidechain account is attached, so
/// the deposit can only be refunded.
pub fn plain_signature_sender(tx: &Transaction, network: Network) -> Option<LockSender> {
    let input = tx.input.first()?;
    let pushes = push_data(&input.script_sig)?;
    let pubkey = PublicKey::from_slice(pushes.last()?).ok()?;
    debug!(txid = %tx.compute_txid(), "falling back to plain signature sender");
    Some(LockSender::new(
        TxSenderType::P2pkh,
        Address::p2pkh(pubkey.pubkey_hash(), network),
        None,
    ))
}

fn single_key_sender(tx_type: TxSenderType, pubkey: &PublicKey, network: Network) -> LockSender {
    LockSender::new(
        tx_type,
        Address::p2pkh(pubkey.pubkey_hash(), network),
        Some(SidechainAddress::from_public_key(&pubkey.inner)),
    )
}

fn p2sh_sender(tx_type: TxSenderType, redeem: &Script, network: Network) -> Option<LockSender> {
    let address = Address::p2sh(redeem, network).ok()?;
    Some(LockSender::new(tx_type, address, None))
}

/// All push operations of a push-only script, `None` if it has any other opcode.
fn push_data(script: &Script) -> Option<Vec<&[u8]>> {
    script
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(pb)) => Some(pb.as_bytes()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        multisig_deposit, p2pkh_deposit, p2sh_p2wpkh_deposit, p2sh_p2wsh_multisig_deposit,
        secret_key, sender_pubkey,
    };

    const NET: Network = Network::Regtest;

    #[test]
    fn test_classifies_p2pkh() {
        let sk = secret_key(100);
        let pk = sender_pubkey(&sk);
        let tx = p2pkh_deposit(&sk, &[]);

        let sender = ScriptLockSenderProvider.try_get(&tx, NET).unwrap();
        assert_eq!(sender.tx_type(), TxSenderType::P2pkh);
        assert_eq!(sender.btc_address(), &Address::p2pkh(pk.pubkey_hash(), NET));
        assert_eq!(
            sender.sidechain_address(),
            Some(SidechainAddress::from_public_key(&pk.inner))
        );
    }

    #[test]
    fn test_classifies_p2sh_p2wpkh() {
        let sk = secret_key(101);
        let pk = sender_pubkey(&sk);
        let tx = p2sh_p2wpkh_deposit(&sk, &[]);

        let sender = ScriptLockSenderProvider.try_get(&tx, NET).unwrap();
        assert_eq!(sender.tx_type(), TxSenderType::P2shP2wpkh);
        let expected = Address::p2shwpkh(&pk.try_into().unwrap(), NET);
        assert_eq!(sender.btc_address(), &expected);
        assert_eq!(
            sender.sidechain_address(),
            Some(SidechainAddress::from_public_key(&pk.inner))
        );
    }

    #[test]
    fn test_classifies_multisig_without_sidechain_address() {
        let (tx, redeem) = multisig_deposit(102, &[]);
        let sender = ScriptLockSenderProvider.try_get(&tx, NET).unwrap();
        assert_eq!(sender.tx_type(), TxSenderType::P2shMultisig);
        assert_eq!(sender.btc_address(), &Address::p2sh(&redeem, NET).unwrap());
        assert_eq!(sender.sidechain_address(), None);

        let (tx, _) = p2sh_p2wsh_multisig_deposit(103, &[]);
        let sender = ScriptLockSenderProvider.try_get(&tx, NET).unwrap();
        assert_eq!(sender.tx_type(), TxSenderType::P2shP2wshMultisig);
        assert_eq!(sender.sidechain_address(), None);
    }

    #[test]
    fn test_unrecognized_and_fallback() {
        let sk = secret_key(104);
        let mut tx = p2pkh_deposit(&sk, &[]);
        // Three pushes is no template we know.
        let mut script = tx.input[0].script_sig.to_bytes();
        script.extend_from_slice(&[0x01, 0x01]);
        tx.input[0].script_sig = ScriptBuf::from_bytes(script);
        assert_eq!(ScriptLockSenderProvider.try_get(&tx, NET), None);

        let fallback = plain_signature_sender(&tx, NET);
        // Last push is no longer a key.
        assert_eq!(fallback, None);

        let tx = p2pkh_deposit(&sk, &[]);
        let fallback = plain_signature_sender(&tx, NET).unwrap();
        assert_eq!(fallback.sidechain_address(), None);
        assert_eq!(
            fallback.btc_address(),
            &Address::p2pkh(sender_pubkey(&sk).pubkey_hash(), NET)
        );
    }
}
