// src/aggregator.rs
use std::fmt::Debug;

use ethers::types::{Address, Bytes, H256, U256};
use tracing::debug;

use crate::bls::{
    aggregate, hash_to_point, verify_batch, verify_single, BlsDomain, BlsPublicKey, BlsSignature,
    MessagePoint,
};
use crate::error::AggregatorError;
use crate::types::PackedUserOperation;

/// Lookup of the BLS key registered by an account.
pub trait PublicKeySource {
    fn bls_public_key(&self, account: Address) -> Option<BlsPublicKey>;
}

/// Verifies and combines the signatures of operations whose accounts delegate to it.
pub trait SignatureAggregator: Send + Sync {
    fn address(&self) -> Address;

    /// Checks one combined `signature` over all of `user_ops`.
    fn validate_signatures(
        &self,
        keys: &dyn PublicKeySource,
        user_ops: &[PackedUserOperation],
        signature: &[u8],
    ) -> Result<(), AggregatorError>;

    /// Checks a single operation's own signature and returns the signature the operation
    /// should carry inside an aggregated bundle.
    fn validate_user_op_signature(
        &self,
        keys: &dyn PublicKeySource,
        user_op: &PackedUserOperation,
    ) -> Result<Bytes, AggregatorError>;

    /// Combines the per-operation signatures into one.
    fn aggregate_signatures(
        &self,
        user_ops: &[PackedUserOperation],
    ) -> Result<Bytes, AggregatorError>;
}

/// BLS aggregator bound to one entry point, chain and domain tag.
#[derive(Clone)]
pub struct BlsSignatureAggregator {
    address: Address,
    entry_point: Address,
    chain_id: u64,
    domain: BlsDomain,
}

impl BlsSignatureAggregator {
    pub fn new(address: Address, entry_point: Address, chain_id: u64, domain: BlsDomain) -> Self {
        Self {
            address,
            entry_point,
            chain_id,
            domain,
        }
    }

    pub fn domain(&self) -> &BlsDomain {
        &self.domain
    }

    pub fn get_user_op_hash(&self, user_op: &PackedUserOperation) -> H256 {
        user_op.hash(self.entry_point, self.chain_id)
    }

    /// The G1 point an account's key signs for this operation.
    pub fn user_op_to_message(
        &self,
        user_op: &PackedUserOperation,
    ) -> Result<MessagePoint, AggregatorError> {
        Ok(hash_to_point(
            &self.domain,
            self.get_user_op_hash(user_op).as_bytes(),
        )?)
    }

    pub fn user_op_to_message_words(
        &self,
        user_op: &PackedUserOperation,
    ) -> Result<[U256; 2], AggregatorError> {
        Ok(self.user_op_to_message(user_op)?.to_words())
    }

    /// The key the sender registered. Only a sender with no registered key falls back to the
    /// key carried at the tail of its `init_code`.
    pub fn get_user_op_public_key(
        &self,
        keys: &dyn PublicKeySource,
        user_op: &PackedUserOperation,
    ) -> Result<BlsPublicKey, AggregatorError> {
        if let Some(public_key) = keys.bls_public_key(user_op.sender) {
            return Ok(public_key);
        }
        if user_op.init_code.is_empty() {
            return Err(AggregatorError::MissingPublicKey(user_op.sender));
        }
        Ok(BlsPublicKey::from_trailing_bytes(&user_op.init_code)?)
    }
}

impl SignatureAggregator for BlsSignatureAggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn validate_signatures(
        &self,
        keys: &dyn PublicKeySource,
        user_ops: &[PackedUserOperation],
        signature: &[u8],
    ) -> Result<(), AggregatorError> {
        let signature = BlsSignature::from_bytes(signature)?;
        let mut messages = Vec::with_capacity(user_ops.len());
        let mut public_keys = Vec::with_capacity(user_ops.len());
        for user_op in user_ops {
            messages.push(self.user_op_to_message(user_op)?);
            public_keys.push(self.get_user_op_public_key(keys, user_op)?);
        }
        if !verify_batch(&signature, &messages, &public_keys)? {
            debug!(
                "Aggregated signature over {} ops rejected by {:?}",
                user_ops.len(),
                self.address
            );
            return Err(AggregatorError::SignatureValidationFailed);
        }
        Ok(())
    }

    fn validate_user_op_signature(
        &self,
        keys: &dyn PublicKeySource,
        user_op: &PackedUserOperation,
    ) -> Result<Bytes, AggregatorError> {
        let signature = BlsSignature::from_bytes(&user_op.signature)?;
        let message = self.user_op_to_message(user_op)?;
        let public_key = self.get_user_op_public_key(keys, user_op)?;
        if !verify_single(&signature, &message, &public_key) {
            return Err(AggregatorError::SignatureValidationFailed);
        }
        Ok(Bytes::new())
    }

    fn aggregate_signatures(
        &self,
        user_ops: &[PackedUserOperation],
    ) -> Result<Bytes, AggregatorError> {
        let signatures = user_ops
            .iter()
            .map(|op| BlsSignature::from_bytes(&op.signature))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Bytes::from(aggregate(&signatures).to_bytes().to_vec()))
    }
}

impl Debug for BlsSignatureAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsSignatureAggregator")
            .field("address", &self.address)
            .field("entry_point", &self.entry_point)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
