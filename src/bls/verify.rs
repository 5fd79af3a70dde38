// src/bls/verify.rs
use ark_bn254::{Bn254, G2Affine};
use ark_ec::pairing::Pairing;
use ark_ec::AffineRepr;

use super::hash_to_point::MessagePoint;
use super::keys::{BlsPublicKey, BlsSignature};
use crate::error::BlsError;

/// `e(signature, G2) == e(message, public_key)`.
pub fn verify_single(
    signature: &BlsSignature,
    message: &MessagePoint,
    public_key: &BlsPublicKey,
) -> bool {
    Bn254::pairing(signature.0, G2Affine::generator()) == Bn254::pairing(message.0, public_key.0)
}

/// `e(aggregate, G2) == Π e(message_i, public_key_i)`.
///
/// An empty batch verifies only against the point at infinity.
pub fn verify_batch(
    signature: &BlsSignature,
    messages: &[MessagePoint],
    public_keys: &[BlsPublicKey],
) -> Result<bool, BlsError> {
    if messages.len() != public_keys.len() {
        return Err(BlsError::LengthMismatch {
            messages: messages.len(),
            keys: public_keys.len(),
        });
    }
    let lhs = Bn254::pairing(signature.0, G2Affine::generator());
    let rhs = Bn254::multi_pairing(
        messages.iter().map(|m| m.0),
        public_keys.iter().map(|pk| pk.0),
    );
    Ok(lhs == rhs)
}
