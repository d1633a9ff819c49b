use std::collections::BTreeSet;

use bitcoin::{
    Address, Network, PublicKey, Script, ScriptBuf, TxIn,
    opcodes::all::OP_CHECKMULTISIG,
    script::{Builder, Instruction},
};
use strata_peg_primitives::SidechainHeight;

use crate::FederationError;

/// Largest key count a standard P2SH `OP_CHECKMULTISIG` redeem script may hold.
pub const MAX_FEDERATION_SIZE: usize = 15;

/// Multisig custodian set.
///
/// Members are kept sorted by their compressed serialization so that every
/// node derives the same redeem script and address from the same key set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Federation {
    members: Vec<PublicKey>,
    creation_time_ms: u64,
    creation_block: SidechainHeight,
    network: Network,
    redeem_script: ScriptBuf,
    address: Address,
}

impl Federation {
    /// Builds a federation, deriving its `m`-of-`n` redeem script and P2SH
    /// address with `m = n / 2 + 1`.
    pub fn try_new(
        mut members: Vec<PublicKey>,
        creation_time_ms: u64,
        creation_block: SidechainHeight,
        network: Network,
    ) -> Result<Self, FederationError> {
        if members.is_empty() {
            return Err(FederationError::NoMembers);
        }
        if members.len() > MAX_FEDERATION_SIZE {
            return Err(FederationError::TooManyMembers(members.len()));
        }

        members.sort_by_key(|k| k.to_bytes());
        let unique: BTreeSet<_> = members.iter().map(|k| k.to_bytes()).collect();
        if unique.len() != members.len() {
            return Err(FederationError::DuplicateMember);
        }

        let threshold = members.len() / 2 + 1;
        let redeem_script = multisig_redeem_script(threshold, &members);
        let address = Address::p2sh(&redeem_script, network)
            .map_err(|e| FederationError::Script(e.to_string()))?;

        Ok(Self {
            members,
            creation_time_ms,
            creation_block,
            network,
            redeem_script,
            address,
        })
    }

    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Signatures needed to spend federation funds.
    pub fn threshold(&self) -> usize {
        self.members.len() / 2 + 1
    }

    pub fn creation_time_ms(&self) -> u64 {
        self.creation_time_ms
    }

    pub fn creation_block(&self) -> SidechainHeight {
        self.creation_block
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether `script_pubkey` pays this federation.
    pub fn is_paid_by(&self, script_pubkey: &Script) -> bool {
        self.address.script_pubkey().as_script() == script_pubkey
    }

    /// Whether `input` spends from this federation, i.e. its script sig ends
    /// with a push of our redeem script.
    pub fn is_spent_by(&self, input: &TxIn) -> bool {
        let last_push = input
            .script_sig
            .instructions()
            .filter_map(|ins| match ins {
                Ok(Instruction::PushBytes(pb)) => Some(pb.as_bytes()),
                _ => None,
            })
            .last();
        last_push == Some(self.redeem_script.as_bytes())
    }
}

/// `OP_m <key>... OP_n OP_CHECKMULTISIG`
pub fn multisig_redeem_script(threshold: usize, keys: &[PublicKey]) -> ScriptBuf {
    let builder = keys
        .iter()
        .fold(Builder::new().push_int(threshold as i64), |b, k| b.push_key(k));
    builder
        .push_int(keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Whether `script` has the shape of a bare multisig redeem script.
pub fn is_multisig_script(script: &Script) -> bool {
    script.as_bytes().last() == Some(&OP_CHECKMULTISIG.to_u8())
}
