use bitcoin::{OutPoint, Txid};
use strata_peg_btc_verification::{ConfirmationError, MerkleProofError};
use strata_peg_primitives::{AmountError, BitcoinAmount, SidechainAddress, SidechainHeight};
use thiserror::Error;

use crate::TxSenderType;

/// Failures of the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("missing entity: {0}")]
    Missing(&'static str),

    #[error("storage backend: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the native balance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{account} has insufficient balance")]
    InsufficientBalance { account: SidechainAddress },

    #[error("balance of {account}: {source}")]
    Amount {
        account: SidechainAddress,
        #[source]
        source: AmountError,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event log: {0}")]
pub struct EventLogError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederationError {
    #[error("federation has no members")]
    NoMembers,

    #[error("federation lists a member twice")]
    DuplicateMember,

    /// Standard P2SH multisig allows at most 15 keys.
    #[error("federation has {0} members, at most 15 allowed")]
    TooManyMembers(usize),

    #[error("federation redeem script: {0}")]
    Script(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundsError {
    /// A UTXO may only ever be owned by one federation, once.
    #[error("utxo {0} already tracked")]
    DuplicateUtxo(OutPoint),

    #[error("utxo {0} not tracked")]
    UtxoNotFound(OutPoint),

    #[error("no retiring federation")]
    NoRetiringFederation,

    #[error("a federation rotation is already in progress")]
    RotationInProgress,

    #[error("retiring federation still holds {0}")]
    RetiringNotEmpty(BitcoinAmount),

    #[error("requested {requested}, only {available} available")]
    InsufficientFunds {
        requested: BitcoinAmount,
        available: BitcoinAmount,
    },

    #[error("funds arithmetic: {0}")]
    Amount(#[from] AmountError),
}

/// Marking a hash processed twice means two nodes could diverge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessedTxError {
    #[error("tx {txid} already marked processed at height {height}")]
    AlreadyMarked { txid: Txid, height: SidechainHeight },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundError {
    #[error("refund of {value} would be dust after a fee of {fee}")]
    Dust {
        value: BitcoinAmount,
        fee: BitcoinAmount,
    },

    #[error("refund has no inputs")]
    NoInputs,

    #[error("refund arithmetic: {0}")]
    Amount(#[from] AmountError),
}

/// Why a proposed value was refused by its validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidProposal {
    #[error("value must be positive")]
    NotPositive,

    #[error("value above the allowed maximum")]
    AboveMaximum,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElectionError {
    #[error("no value proposed")]
    NullProposal,

    #[error("{0} is not an authorized voter")]
    Unauthorized(SidechainAddress),

    #[error("invalid proposal: {0}")]
    InvalidValue(#[from] InvalidProposal),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ElectionError {
    /// Integer code returned to legacy callers, if the error has one.
    pub fn legacy_code(&self) -> Option<i32> {
        match self {
            Self::Unauthorized(_) => Some(-10),
            Self::InvalidValue(InvalidProposal::NotPositive) => Some(-1),
            Self::InvalidValue(InvalidProposal::AboveMaximum) => Some(-2),
            Self::NullProposal | Self::Storage(_) => None,
        }
    }
}

/// Stage of the registration pipeline a transaction had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistrationStage {
    ProofPending,
    ProofVerified,
    Classified,
    PolicyEvaluated,
    Settled,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("tx {txid} already processed at height {height}")]
    AlreadyProcessed { txid: Txid, height: SidechainHeight },

    #[error("undecodable bitcoin tx: {0}")]
    InvalidTransaction(String),

    #[error("inclusion proof: {0}")]
    Proof(#[from] MerkleProofError),

    #[error("confirmations: {0}")]
    Confirmations(#[from] ConfirmationError),

    #[error("tx {0} pays no federation address")]
    NoMatchingOutput(Txid),

    /// Sender template not accepted before segwit-compatible senders activate.
    #[error("tx {txid} sender type {sender_type:?} not accepted yet")]
    SenderNotAccepted {
        txid: Txid,
        sender_type: TxSenderType,
    },

    #[error("tx {0} sender could not be determined")]
    UnknownSender(Txid),

    #[error("tx {txid} locks {value}, minimum is {minimum}")]
    BelowMinimumLockValue {
        txid: Txid,
        value: BitcoinAmount,
        minimum: BitcoinAmount,
    },

    #[error("federation funds: {0}")]
    Funds(#[from] FundsError),

    #[error("amount: {0}")]
    Amount(#[from] AmountError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("replay registry: {0}")]
    Processed(#[from] ProcessedTxError),
}

impl RegistrationError {
    /// The same registration may succeed on a later block.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Confirmations(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// State is inconsistent and the enclosing block must be abandoned.
    pub fn is_consensus_fatal(&self) -> bool {
        matches!(
            self,
            Self::Funds(_)
                | Self::Amount(_)
                | Self::Ledger(_)
                | Self::Storage(_)
                | Self::Processed(_)
        )
    }

    /// Last stage the transaction completed before failing.
    pub fn stage(&self) -> RegistrationStage {
        match self {
            Self::AlreadyProcessed { .. }
            | Self::InvalidTransaction(_)
            | Self::Proof(_)
            | Self::Confirmations(_) => RegistrationStage::ProofPending,
            Self::NoMatchingOutput(_)
            | Self::SenderNotAccepted { .. }
            | Self::UnknownSender(_) => RegistrationStage::ProofVerified,
            Self::BelowMinimumLockValue { .. } => RegistrationStage::Classified,
            Self::Funds(_)
            | Self::Amount(_)
            | Self::Ledger(_)
            | Self::Storage(_)
            | Self::Processed(_) => RegistrationStage::PolicyEvaluated,
        }
    }
}
