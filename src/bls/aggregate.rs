// src/bls/aggregate.rs
use ark_bn254::G1Projective;
use ark_ec::CurveGroup;
use ark_ff::Zero;
use ethers::types::Bytes;

use super::keys::BlsSignature;
use crate::error::EncodingError;

/// An aggregate has the same 64-byte shape as a single signature.
pub type AggregateSignature = BlsSignature;

/// Sums signature points. The result does not depend on input order; one input comes back
/// unchanged and no inputs give the point at infinity.
pub fn aggregate(signatures: &[BlsSignature]) -> AggregateSignature {
    let sum = signatures
        .iter()
        .fold(G1Projective::zero(), |acc, sig| acc + sig.0);
    BlsSignature(sum.into_affine())
}

/// Decodes each 64-byte signature and returns the encoded aggregate.
pub fn aggregate_bytes<T: AsRef<[u8]>>(signatures: &[T]) -> Result<Bytes, EncodingError> {
    let decoded = signatures
        .iter()
        .map(|sig| BlsSignature::from_bytes(sig.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Bytes::from(aggregate(&decoded).to_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::{BlsDomain, BlsSecretKey};
    use ethers::utils::keccak256;

    fn signed(seed: &[u8], message: &[u8]) -> BlsSignature {
        BlsSecretKey::from_bytes(&keccak256(seed))
            .unwrap()
            .sign(&BlsDomain::default(), message)
            .unwrap()
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let s1 = signed(b"a", b"0x1234");
        let s2 = signed(b"b", b"0x5678");
        let s3 = signed(b"c", b"0x9abc");
        assert_eq!(aggregate(&[s1, s2]), aggregate(&[s2, s1]));
        assert_eq!(aggregate(&[s1, s2, s3]), aggregate(&[s3, s1, s2]));
    }

    #[test]
    fn test_aggregate_single_and_empty() {
        let s1 = signed(b"a", b"0x1234");
        assert_eq!(aggregate(&[s1]), s1);
        let empty = aggregate(&[]);
        assert!(empty.is_identity());
        assert_eq!(empty.to_bytes(), [0u8; 64]);
    }

    #[test]
    fn test_aggregate_bytes() {
        let s1 = signed(b"a", b"0x1234");
        let s2 = signed(b"b", b"0x5678");
        let combined = aggregate_bytes(&[s1.to_bytes().to_vec(), s2.to_bytes().to_vec()]).unwrap();
        assert_eq!(combined.to_vec(), aggregate(&[s1, s2]).to_bytes().to_vec());
        assert!(aggregate_bytes(&[vec![0u8; 10]]).is_err());
    }
}
