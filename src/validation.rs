// src/validation.rs
use ethers::types::{Address, H160, U256};
use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Largest value representable in 48 bits.
pub const MAX_UINT48: u64 = (1 << 48) - 1;

/// Identity returned by an account whose signature check failed.
pub const SIG_VALIDATION_FAILED: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
]);

/// Decoded form of the 256-bit word returned by every validation call:
/// `validAfter(48) ‖ validUntil(48) ‖ identity(160)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    pub aggregator: Address,
    pub valid_after: u64,
    pub valid_until: u64,
}

/// How an operation's signature is to be checked, selected by the identity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The account could not authenticate the operation.
    Unsigned,
    /// The account validated its own signature.
    Individual,
    /// The account delegates to this aggregator.
    Aggregated(Address),
}

impl ValidationData {
    pub fn new(aggregator: Address, valid_after: u64, valid_until: u64) -> Self {
        Self {
            aggregator,
            valid_after,
            valid_until,
        }
    }

    /// Packs into a word. Both window bounds must fit in 48 bits.
    pub fn pack(&self) -> U256 {
        debug_assert!(
            self.valid_after <= MAX_UINT48 && self.valid_until <= MAX_UINT48,
            "validity window [{}, {}] does not fit in 48 bits",
            self.valid_after,
            self.valid_until
        );
        let mask = U256::from(MAX_UINT48);
        let valid_after = U256::from(self.valid_after) & mask;
        let valid_until = U256::from(self.valid_until) & mask;
        (((valid_after << 48) | valid_until) << 160) | U256::from_big_endian(self.aggregator.as_bytes())
    }

    /// Unpacks a word.
    ///
    /// NOTE: a zero `validUntil` decodes as `MAX_UINT48` ("never expires") while a zero
    /// `validAfter` stays zero. `parse(pack(x))` is therefore not the identity when
    /// `x.valid_until == 0`.
    pub fn parse(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        Self::from_word_bytes(&bytes)
    }

    /// Unpacks a big-endian word, rejecting anything that is not exactly 32 bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        let bytes: &[u8; 32] = data.try_into().map_err(|_| EncodingError::InvalidLength {
            what: "validationData",
            expected: 32,
            actual: data.len(),
        })?;
        Ok(Self::from_word_bytes(bytes))
    }

    fn from_word_bytes(bytes: &[u8; 32]) -> Self {
        let aggregator = Address::from_slice(&bytes[12..]);
        let mut valid_until = read_uint48(&bytes[6..12]);
        if valid_until == 0 {
            valid_until = MAX_UINT48;
        }
        let valid_after = read_uint48(&bytes[..6]);
        Self {
            aggregator,
            valid_after,
            valid_until,
        }
    }

    pub fn signature_check(&self) -> SignatureCheck {
        if self.aggregator.is_zero() {
            SignatureCheck::Individual
        } else if self.aggregator == SIG_VALIDATION_FAILED {
            SignatureCheck::Unsigned
        } else {
            SignatureCheck::Aggregated(self.aggregator)
        }
    }

    /// Inclusive check of `now` against `[validAfter, validUntil]`.
    pub fn is_within(&self, now: u64) -> bool {
        self.valid_after <= now && now <= self.valid_until
    }

    /// Narrows the window to the overlap with `other`, keeping this value's identity.
    pub fn intersect(&self, other: &ValidationData) -> Self {
        Self {
            aggregator: self.aggregator,
            valid_after: self.valid_after.max(other.valid_after),
            valid_until: self.valid_until.min(other.valid_until),
        }
    }
}

impl From<ValidationData> for U256 {
    fn from(data: ValidationData) -> Self {
        data.pack()
    }
}

fn read_uint48(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reverses_pack() {
        let aggregator = Address::repeat_byte(0xab);
        for valid_until in [1, 2, 1_700_000_000, MAX_UINT48 - 1, MAX_UINT48] {
            let data = ValidationData::new(aggregator, 12345, valid_until);
            assert_eq!(ValidationData::parse(data.pack()), data);
        }
        let edge = ValidationData::new(Address::zero(), MAX_UINT48, 1);
        assert_eq!(ValidationData::parse(edge.pack()), edge);
    }

    #[test]
    fn test_zero_valid_until_means_no_expiry() {
        let data = ValidationData::new(Address::zero(), 0, 0);
        let parsed = ValidationData::parse(data.pack());
        assert_eq!(parsed.valid_until, MAX_UINT48);
        assert_eq!(parsed.valid_after, 0);
        assert_ne!(parsed, data);
        assert_eq!(ValidationData::parse(U256::zero()).valid_until, MAX_UINT48);
    }

    #[test]
    fn test_bit_layout() {
        let aggregator = Address::from_low_u64_be(0x1234);
        let word = ValidationData::new(aggregator, 3, 5).pack();
        let expected = (U256::from(3u64) << 208) + (U256::from(5u64) << 160) + U256::from(0x1234u64);
        assert_eq!(word, expected);
    }

    #[test]
    fn test_parse_bytes_requires_full_word() {
        let err = ValidationData::parse_bytes(&[0u8; 31]).unwrap_err();
        assert_eq!(
            err,
            EncodingError::InvalidLength {
                what: "validationData",
                expected: 32,
                actual: 31
            }
        );
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let parsed = ValidationData::parse_bytes(&bytes).unwrap();
        assert_eq!(parsed.signature_check(), SignatureCheck::Unsigned);
    }

    #[test]
    fn test_signature_check_selection() {
        assert_eq!(
            ValidationData::new(Address::zero(), 0, 0).signature_check(),
            SignatureCheck::Individual
        );
        assert_eq!(
            ValidationData::new(SIG_VALIDATION_FAILED, 0, 0).signature_check(),
            SignatureCheck::Unsigned
        );
        let aggregator = Address::repeat_byte(0x42);
        assert_eq!(
            ValidationData::new(aggregator, 0, 0).signature_check(),
            SignatureCheck::Aggregated(aggregator)
        );
    }

    #[test]
    fn test_time_window_is_inclusive() {
        let data = ValidationData::new(Address::zero(), 100, 200);
        assert!(!data.is_within(99));
        assert!(data.is_within(100));
        assert!(data.is_within(200));
        assert!(!data.is_within(201));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit in 48 bits")]
    fn test_pack_rejects_wide_valid_until() {
        ValidationData::new(Address::zero(), 0, MAX_UINT48 + 1).pack();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit in 48 bits")]
    fn test_pack_rejects_wide_valid_after() {
        ValidationData::new(Address::zero(), 1 << 48, 10).pack();
    }

    #[test]
    fn test_intersect() {
        let account = ValidationData::new(Address::zero(), 100, 500);
        let paymaster = ValidationData::new(Address::repeat_byte(1), 200, 300);
        assert_eq!(
            account.intersect(&paymaster),
            ValidationData::new(Address::zero(), 200, 300)
        );
    }
}
