// src/bls/mod.rs
//! BLS signatures over BN254 as verified by the EVM pairing precompile: signatures and
//! messages live in G1 (64 bytes), public keys in G2 (128 bytes).

mod aggregate;
mod hash_to_point;
mod keys;
mod verify;

use ethers::types::H256;
use ethers::utils::keccak256;

pub use aggregate::{aggregate, aggregate_bytes, AggregateSignature};
pub use hash_to_point::{hash_to_point, MessagePoint};
pub use keys::{
    get_trailing_public_key, BlsPublicKey, BlsSecretKey, BlsSignature, PUBLIC_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
pub use verify::{verify_batch, verify_single};

/// Label hashed into the default domain tag.
pub const DEFAULT_DOMAIN_LABEL: &str = "eip4337.bls.domain";

/// Domain-separation tag mixed into every hash-to-point call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsDomain(H256);

impl BlsDomain {
    pub fn new(tag: H256) -> Self {
        Self(tag)
    }

    pub fn from_label(label: &str) -> Self {
        Self(H256(keccak256(label.as_bytes())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn tag(&self) -> H256 {
        self.0
    }
}

impl Default for BlsDomain {
    fn default() -> Self {
        Self::from_label(DEFAULT_DOMAIN_LABEL)
    }
}
