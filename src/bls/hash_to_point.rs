// src/bls/hash_to_point.rs
use ark_bn254::{Fq, G1Affine};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, One, PrimeField, Zero};
use ethers::types::U256;
use ethers::utils::keccak256;

use super::keys::g1_words;
use super::BlsDomain;
use crate::error::BlsError;

const EXPANDED_LENGTH: usize = 96;
const ZERO_PAD_LENGTH: usize = 64;

/// A message mapped into G1, ready for pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePoint(pub(crate) G1Affine);

impl MessagePoint {
    pub fn to_words(&self) -> [U256; 2] {
        g1_words(&self.0)
    }
}

/// Maps `message` to a G1 point under `domain`.
///
/// expand_message_xmd with keccak256 yields two field elements, each is sent through the
/// Fouque-Tibouchi map, and the two points are added.
pub fn hash_to_point(domain: &BlsDomain, message: &[u8]) -> Result<MessagePoint, BlsError> {
    let [u0, u1] = hash_to_field(domain.as_bytes(), message);
    let p0 = map_to_point(u0)?;
    let p1 = map_to_point(u1)?;
    Ok(MessagePoint((p0.into_group() + p1).into_affine()))
}

fn hash_to_field(domain: &[u8], message: &[u8]) -> [Fq; 2] {
    let expanded = expand_message(domain, message);
    [
        Fq::from_be_bytes_mod_order(&expanded[..48]),
        Fq::from_be_bytes_mod_order(&expanded[48..]),
    ]
}

fn expand_message(domain: &[u8], message: &[u8]) -> [u8; EXPANDED_LENGTH] {
    let mut dst_prime = domain.to_vec();
    dst_prime.push(domain.len() as u8);

    let mut b0_input = vec![0u8; ZERO_PAD_LENGTH];
    b0_input.extend_from_slice(message);
    b0_input.extend_from_slice(&(EXPANDED_LENGTH as u16).to_be_bytes());
    b0_input.push(0);
    b0_input.extend_from_slice(&dst_prime);
    let b0 = keccak256(&b0_input);

    let mut out = [0u8; EXPANDED_LENGTH];
    let mut previous = [0u8; 32];
    for (i, chunk) in out.chunks_mut(32).enumerate() {
        let mut input = Vec::with_capacity(33 + dst_prime.len());
        input.extend(b0.iter().zip(previous.iter()).map(|(a, b)| a ^ b));
        input.push(i as u8 + 1);
        input.extend_from_slice(&dst_prime);
        previous = keccak256(&input);
        chunk.copy_from_slice(&previous);
    }
    out
}

/// Fouque-Tibouchi encoding onto `y^2 = x^3 + 3`.
fn map_to_point(t: Fq) -> Result<G1Affine, BlsError> {
    if t.is_zero() {
        return Err(BlsError::HashToPoint);
    }
    let b = Fq::from(3u64);
    let sqrt_neg_three = (-Fq::from(3u64)).sqrt().ok_or(BlsError::HashToPoint)?;
    let half = Fq::from(2u64).inverse().ok_or(BlsError::HashToPoint)?;
    let z = (sqrt_neg_three - Fq::one()) * half;

    // w = sqrt(-3) * t / (1 + b + t^2)
    let denominator = Fq::one() + b + t.square();
    let w = sqrt_neg_three * t * denominator.inverse().ok_or(BlsError::HashToPoint)?;
    let w_sq_inv = w.square().inverse().ok_or(BlsError::HashToPoint)?;

    let x1 = z - t * w;
    let x2 = -Fq::one() - x1;
    let x3 = Fq::one() + w_sq_inv;

    for x in [x1, x2, x3] {
        let rhs = x.square() * x + b;
        if let Some(mut y) = rhs.sqrt() {
            if t.legendre().is_qnr() {
                y = -y;
            }
            return Ok(G1Affine::new_unchecked(x, y));
        }
    }
    Err(BlsError::HashToPoint)
}
