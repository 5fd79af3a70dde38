// src/bls/keys.rs
use ark_bn254::{Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInt, BigInteger, PrimeField, Zero};
use ethers::types::U256;

use super::hash_to_point::hash_to_point;
use super::BlsDomain;
use crate::error::{BlsError, EncodingError};

pub const PUBLIC_KEY_LENGTH: usize = 128;
pub const SIGNATURE_LENGTH: usize = 64;

/// Public key: a G2 point encoded as `[x.c1, x.c0, y.c1, y.c0]`, four big-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsPublicKey(pub(crate) G2Affine);

/// Signature: a G1 point encoded as `[x, y]`. The point at infinity encodes as 64 zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature(pub(crate) G1Affine);

/// Private scalar of a signer. Signing happens off-chain; the admission flow only verifies.
#[derive(Clone)]
pub struct BlsSecretKey(Fr);

/// Reads the last 128 bytes of `data` as four words, ignoring whatever precedes them.
pub fn get_trailing_public_key(data: &[u8]) -> Result<[U256; 4], EncodingError> {
    if data.len() < PUBLIC_KEY_LENGTH {
        return Err(EncodingError::TooShort {
            what: "publicKey",
            min: PUBLIC_KEY_LENGTH,
            actual: data.len(),
        });
    }
    let tail = &data[data.len() - PUBLIC_KEY_LENGTH..];
    Ok(std::array::from_fn(|i| U256::from_big_endian(&tail[i * 32..(i + 1) * 32])))
}

pub(crate) fn fq_from_be(bytes: &[u8], what: &'static str) -> Result<Fq, EncodingError> {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let start = 32 - (i + 1) * 8;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[start..start + 8]);
        *limb = u64::from_be_bytes(buf);
    }
    Fq::from_bigint(BigInt::new(limbs)).ok_or(EncodingError::NonCanonicalField(what))
}

pub(crate) fn fq_to_be(value: &Fq) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_be());
    out
}

pub(crate) fn decode_g1(data: &[u8], what: &'static str) -> Result<G1Affine, EncodingError> {
    if data.len() != SIGNATURE_LENGTH {
        return Err(EncodingError::InvalidLength {
            what,
            expected: SIGNATURE_LENGTH,
            actual: data.len(),
        });
    }
    let x = fq_from_be(&data[..32], what)?;
    let y = fq_from_be(&data[32..], what)?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(EncodingError::NotOnCurve(what));
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(EncodingError::NotInSubgroup(what));
    }
    Ok(point)
}

pub(crate) fn encode_g1(point: &G1Affine) -> [u8; SIGNATURE_LENGTH] {
    let mut out = [0u8; SIGNATURE_LENGTH];
    if point.infinity {
        return out;
    }
    out[..32].copy_from_slice(&fq_to_be(&point.x));
    out[32..].copy_from_slice(&fq_to_be(&point.y));
    out
}

pub(crate) fn g1_words(point: &G1Affine) -> [U256; 2] {
    let bytes = encode_g1(point);
    [
        U256::from_big_endian(&bytes[..32]),
        U256::from_big_endian(&bytes[32..]),
    ]
}

impl BlsPublicKey {
    pub fn from_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() != PUBLIC_KEY_LENGTH {
            return Err(EncodingError::InvalidLength {
                what: "publicKey",
                expected: PUBLIC_KEY_LENGTH,
                actual: data.len(),
            });
        }
        let x_c1 = fq_from_be(&data[..32], "publicKey")?;
        let x_c0 = fq_from_be(&data[32..64], "publicKey")?;
        let y_c1 = fq_from_be(&data[64..96], "publicKey")?;
        let y_c0 = fq_from_be(&data[96..], "publicKey")?;
        let x = Fq2::new(x_c0, x_c1);
        let y = Fq2::new(y_c0, y_c1);
        if x.is_zero() && y.is_zero() {
            return Err(EncodingError::IdentityPoint("publicKey"));
        }
        let point = G2Affine::new_unchecked(x, y);
        if !point.is_on_curve() {
            return Err(EncodingError::NotOnCurve("publicKey"));
        }
        if !point.is_in_correct_subgroup_assuming_on_curve() {
            return Err(EncodingError::NotInSubgroup("publicKey"));
        }
        Ok(Self(point))
    }

    /// Decodes the key stored in the trailing 128 bytes of `data`.
    pub fn from_trailing_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        Self::from_words(get_trailing_public_key(data)?)
    }

    pub fn from_words(words: [U256; 4]) -> Result<Self, EncodingError> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        for (i, word) in words.iter().enumerate() {
            word.to_big_endian(&mut bytes[i * 32..(i + 1) * 32]);
        }
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out[..32].copy_from_slice(&fq_to_be(&self.0.x.c1));
        out[32..64].copy_from_slice(&fq_to_be(&self.0.x.c0));
        out[64..96].copy_from_slice(&fq_to_be(&self.0.y.c1));
        out[96..].copy_from_slice(&fq_to_be(&self.0.y.c0));
        out
    }

    pub fn to_words(&self) -> [U256; 4] {
        let bytes = self.to_bytes();
        std::array::from_fn(|i| U256::from_big_endian(&bytes[i * 32..(i + 1) * 32]))
    }
}

impl BlsSignature {
    pub fn from_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        decode_g1(data, "signature").map(Self)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        encode_g1(&self.0)
    }

    pub fn to_words(&self) -> [U256; 2] {
        g1_words(&self.0)
    }

    pub fn is_identity(&self) -> bool {
        self.0.infinity
    }
}

impl BlsSecretKey {
    /// Interprets `bytes` as a big-endian scalar reduced modulo the group order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlsError> {
        let scalar = Fr::from_be_bytes_mod_order(bytes);
        if scalar.is_zero() {
            return Err(BlsError::InvalidSecretKey);
        }
        Ok(Self(scalar))
    }

    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey((G2Affine::generator() * self.0).into_affine())
    }

    /// Signs `message` under `domain`: `hash_to_point(domain, message) * sk`.
    pub fn sign(&self, domain: &BlsDomain, message: &[u8]) -> Result<BlsSignature, BlsError> {
        let point = hash_to_point(domain, message)?;
        Ok(BlsSignature((point.0 * self.0).into_affine()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::utils::keccak256;

    #[test]
    fn test_trailing_public_key_ignores_prefix() {
        let data = encode(&[Token::FixedArray(
            (1..=6u64).map(|i| Token::Uint(U256::from(i))).collect(),
        )]);
        assert_eq!(data.len(), 192);
        let last4 = get_trailing_public_key(&data).unwrap();
        assert_eq!(last4, [3u64, 4, 5, 6].map(U256::from));
    }

    #[test]
    fn test_trailing_public_key_too_short() {
        assert_eq!(
            get_trailing_public_key(&[0u8; 127]),
            Err(EncodingError::TooShort {
                what: "publicKey",
                min: PUBLIC_KEY_LENGTH,
                actual: 127,
            })
        );
    }

    #[test]
    fn test_public_key_words_roundtrip() {
        let sk = BlsSecretKey::from_bytes(&keccak256(b"key-1")).unwrap();
        let pk = sk.public_key();
        assert_eq!(BlsPublicKey::from_words(pk.to_words()).unwrap(), pk);

        let mut init_code = vec![0xfa; 20];
        init_code.extend_from_slice(&pk.to_bytes());
        assert_eq!(BlsPublicKey::from_trailing_bytes(&init_code).unwrap(), pk);
    }

    #[test]
    fn test_rejects_invalid_points() {
        let words = [1u64, 2, 3, 4].map(U256::from);
        assert_eq!(
            BlsPublicKey::from_words(words),
            Err(EncodingError::NotOnCurve("publicKey"))
        );
        assert_eq!(
            BlsPublicKey::from_bytes(&[0u8; PUBLIC_KEY_LENGTH]),
            Err(EncodingError::IdentityPoint("publicKey"))
        );

        let mut sig = [0u8; 64];
        sig[31] = 1;
        sig[63] = 1;
        assert_eq!(
            BlsSignature::from_bytes(&sig),
            Err(EncodingError::NotOnCurve("signature"))
        );
        assert_eq!(
            BlsSignature::from_bytes(&[0u8; 63]),
            Err(EncodingError::InvalidLength {
                what: "signature",
                expected: SIGNATURE_LENGTH,
                actual: 63,
            })
        );
        assert_eq!(
            BlsSignature::from_bytes(&[0xff; 64]),
            Err(EncodingError::NonCanonicalField("signature"))
        );
    }

    #[test]
    fn test_signature_bytes_roundtrip() {
        let sk = BlsSecretKey::from_bytes(&keccak256(b"key-2")).unwrap();
        let sig = sk.sign(&BlsDomain::default(), b"hello").unwrap();
        assert_eq!(BlsSignature::from_bytes(&sig.to_bytes()).unwrap(), sig);
        assert!(BlsSignature::from_bytes(&[0u8; 64]).unwrap().is_identity());
    }

    #[test]
    fn test_zero_secret_key_rejected() {
        assert!(matches!(
            BlsSecretKey::from_bytes(&[0u8; 32]),
            Err(BlsError::InvalidSecretKey)
        ));
    }
}
