// src/lib.rs
//! BLS signature aggregation for ERC-4337 user operations: the packed operation codec, the
//! validation-data word, BN254 BLS signing and batch verification, and an in-memory entry
//! point that admits aggregated batches.

pub mod account;
pub mod aggregator;
pub mod bls;
pub mod entry_point;
pub mod error;
pub mod gas;
pub mod nonce;
pub mod paymaster;
pub mod rpc;
pub mod stake;
pub mod state;
pub mod types;
pub mod user_op;
pub mod validation;

pub use account::{encode_execute, Account, BlsAccount};
pub use aggregator::{BlsSignatureAggregator, PublicKeySource, SignatureAggregator};
pub use bls::{BlsDomain, BlsPublicKey, BlsSecretKey, BlsSignature};
pub use entry_point::{EntryPoint, EntryPointConfig};
pub use error::{FailedOp, FailureKind};
pub use paymaster::{Paymaster, PostOpMode, SimplePaymaster};
pub use types::{
    BlockEnv, HandleOpsOutcome, PackedUserOperation, UserOperation, UserOperationEvent,
    UserOperationRevertReason, UserOpsPerAggregator,
};
pub use validation::{SignatureCheck, ValidationData, SIG_VALIDATION_FAILED};
