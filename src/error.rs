// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{what}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: need at least {min} bytes, got {actual}")]
    TooShort {
        what: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("{0}: coordinate is not a canonical field element")]
    NonCanonicalField(&'static str),

    #[error("{0}: point is not on the curve")]
    NotOnCurve(&'static str),

    #[error("{0}: point is not in the prime-order subgroup")]
    NotInSubgroup(&'static str),

    #[error("{0}: point at infinity is not allowed")]
    IdentityPoint(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlsError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("Digest does not map to a curve point")]
    HashToPoint,

    #[error("Private key is zero")]
    InvalidSecretKey,

    #[error("Got {messages} messages but {keys} public keys")]
    LengthMismatch { messages: usize, keys: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error(transparent)]
    Bls(#[from] BlsError),

    #[error("No BLS public key registered for account {0:?}")]
    MissingPublicKey(Address),

    #[error("BLS signature validation failed")]
    SignatureValidationFailed,
}

impl From<EncodingError> for AggregatorError {
    fn from(err: EncodingError) -> Self {
        AggregatorError::Bls(BlsError::Encoding(err))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("out of gas: limit {limit}")]
    OutOfGas { limit: u128 },

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("unknown call selector 0x{0}")]
    UnknownSelector(String),

    #[error("malformed call data: {0}")]
    MalformedCallData(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("no stake specified")]
    NoStake,

    #[error("must specify unstake delay")]
    ZeroUnstakeDelay,

    #[error("cannot decrease unstake time")]
    DecreasedUnstakeDelay,

    #[error("not staked")]
    NotStaked,

    #[error("already unstaking")]
    AlreadyUnstaking,

    #[error("must call unlockStake() first")]
    StillLocked,

    #[error("No stake to withdraw")]
    NoStakeToWithdraw,

    #[error("Stake withdrawal is not due")]
    WithdrawalNotDue,

    #[error("Withdraw amount too large")]
    InsufficientDeposit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymasterError {
    #[error("sender {0:?} is not whitelisted")]
    NotWhitelisted(Address),

    #[error("max cost {requested} exceeds sponsorship limit {limit}")]
    MaxCostExceeded { requested: U256, limit: U256 },

    #[error("malformed paymaster context")]
    InvalidContext,

    #[error("Invalid UserOperation: {0}")]
    InvalidUserOperation(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Category of an admission failure. Any of them aborts the whole batch; execution errors
/// are reported per operation in the outcome instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Encoding,
    Signature,
    TimeWindow,
    Deposit,
    Nonce,
    Validation,
}

/// Error surfaced by batch admission: the index of the offending operation within the
/// submitted batch and a machine-parseable reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("FailedOp({op_index}, {reason})")]
pub struct FailedOp {
    pub op_index: usize,
    pub kind: FailureKind,
    pub reason: String,
}

impl FailedOp {
    pub fn new(op_index: usize, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            op_index,
            kind,
            reason: reason.into(),
        }
    }
}
