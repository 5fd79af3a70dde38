// src/user_op.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

use crate::error::EncodingError;
use crate::types::{PackedUserOperation, UserOperation};

pub const PAYMASTER_VALIDATION_GAS_OFFSET: usize = 20;
pub const PAYMASTER_POSTOP_GAS_OFFSET: usize = 36;
pub const PAYMASTER_DATA_OFFSET: usize = 52;

pub const DEFAULT_VERIFICATION_GAS_LIMIT: u128 = 150_000;
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 21_000;
pub const DEFAULT_MAX_PRIORITY_FEE_PER_GAS: u128 = 1_000_000_000;
pub const DEFAULT_PAYMASTER_VERIFICATION_GAS_LIMIT: u128 = 300_000;

/// Concatenates two 128-bit values into one word, `high` in the upper 16 bytes.
pub fn pack_uint128_pair(high: u128, low: u128) -> H256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    H256(word)
}

pub fn unpack_uint128_pair(word: H256) -> (u128, u128) {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&word.0[..16]);
    low.copy_from_slice(&word.0[16..]);
    (u128::from_be_bytes(high), u128::from_be_bytes(low))
}

/// Calldata gas: 4 per zero byte, 16 per non-zero byte.
pub fn call_data_cost(data: &[u8]) -> u128 {
    data.iter().map(|b| if *b == 0 { 4 } else { 16 }).sum()
}

fn read_uint128(data: &[u8], offset: usize) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&data[offset..offset + 16]);
    u128::from_be_bytes(buf)
}

impl UserOperation {
    /// Template for a new operation from `sender` with the default gas settings.
    pub fn with_defaults(sender: Address) -> Self {
        Self {
            sender,
            verification_gas_limit: DEFAULT_VERIFICATION_GAS_LIMIT,
            pre_verification_gas: U256::from(DEFAULT_PRE_VERIFICATION_GAS),
            max_priority_fee_per_gas: DEFAULT_MAX_PRIORITY_FEE_PER_GAS,
            ..Default::default()
        }
    }

    /// Fills the fields left at zero.
    ///
    /// Gas limits and the priority fee take their defaults (the paymaster limit only when a
    /// paymaster is set), `max_fee_per_gas` becomes `base_fee + max_priority_fee_per_gas` and
    /// a zero `pre_verification_gas` is replaced by the calldata cost of the filled operation.
    pub fn fill(mut self, base_fee: u128) -> Self {
        if self.verification_gas_limit == 0 {
            self.verification_gas_limit = DEFAULT_VERIFICATION_GAS_LIMIT;
        }
        if self.paymaster.is_some() && self.paymaster_verification_gas_limit == 0 {
            self.paymaster_verification_gas_limit = DEFAULT_PAYMASTER_VERIFICATION_GAS_LIMIT;
        }
        if self.max_priority_fee_per_gas == 0 {
            self.max_priority_fee_per_gas = DEFAULT_MAX_PRIORITY_FEE_PER_GAS;
        }
        if self.max_fee_per_gas == 0 {
            self.max_fee_per_gas = base_fee.saturating_add(self.max_priority_fee_per_gas);
        }
        if self.pre_verification_gas.is_zero() {
            self.pre_verification_gas = U256::from(self.calldata_gas());
        }
        self
    }

    pub fn pack(&self) -> PackedUserOperation {
        let account_gas_limits =
            pack_uint128_pair(self.verification_gas_limit, self.call_gas_limit);
        let gas_fees = pack_uint128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas);

        let paymaster_and_data = match self.paymaster {
            Some(paymaster) if !paymaster.is_zero() => {
                let mut data = Vec::with_capacity(PAYMASTER_DATA_OFFSET + self.paymaster_data.len());
                data.extend_from_slice(paymaster.as_bytes());
                data.extend_from_slice(&self.paymaster_verification_gas_limit.to_be_bytes());
                data.extend_from_slice(&self.paymaster_post_op_gas_limit.to_be_bytes());
                data.extend_from_slice(&self.paymaster_data);
                Bytes::from(data)
            }
            _ => Bytes::new(),
        };

        PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self.init_code.clone(),
            call_data: self.call_data.clone(),
            account_gas_limits,
            pre_verification_gas: self.pre_verification_gas,
            gas_fees,
            paymaster_and_data,
            signature: self.signature.clone(),
        }
    }

    pub fn encode(&self, for_signature: bool) -> Vec<u8> {
        self.pack().encode(for_signature)
    }

    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        self.pack().hash(entry_point, chain_id)
    }

    /// Pre-verification gas covering the calldata of this operation.
    pub fn calldata_gas(&self) -> u128 {
        call_data_cost(&self.encode(false))
    }
}

impl PackedUserOperation {
    pub fn unpack(&self) -> Result<UserOperation, EncodingError> {
        let (verification_gas_limit, call_gas_limit) = unpack_uint128_pair(self.account_gas_limits);
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_uint128_pair(self.gas_fees);
        let (paymaster, paymaster_verification_gas_limit, paymaster_post_op_gas_limit) =
            match self.paymaster_gas_limits()? {
                Some((paymaster, verification, post_op)) => (Some(paymaster), verification, post_op),
                None => (None, 0, 0),
            };
        let paymaster_data = if paymaster.is_some() {
            Bytes::from(self.paymaster_and_data[PAYMASTER_DATA_OFFSET..].to_vec())
        } else {
            Bytes::new()
        };

        Ok(UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self.init_code.clone(),
            call_data: self.call_data.clone(),
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster,
            paymaster_verification_gas_limit,
            paymaster_post_op_gas_limit,
            paymaster_data,
            signature: self.signature.clone(),
        })
    }

    /// ABI-encodes the operation.
    ///
    /// With `for_signature` the dynamic fields are replaced by their keccak so the signed payload
    /// has a fixed shape and the signature is left out. Without it the raw fields and the signature
    /// are encoded, which is only useful for measuring calldata cost.
    pub fn encode(&self, for_signature: bool) -> Vec<u8> {
        if for_signature {
            encode(&[
                Token::Address(self.sender),
                Token::Uint(self.nonce),
                Token::FixedBytes(keccak256(&self.init_code).to_vec()),
                Token::FixedBytes(keccak256(&self.call_data).to_vec()),
                Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
                Token::Uint(self.pre_verification_gas),
                Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
                Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
            ])
        } else {
            encode(&[
                Token::Address(self.sender),
                Token::Uint(self.nonce),
                Token::Bytes(self.init_code.to_vec()),
                Token::Bytes(self.call_data.to_vec()),
                Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
                Token::Uint(self.pre_verification_gas),
                Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
                Token::Bytes(self.paymaster_and_data.to_vec()),
                Token::Bytes(self.signature.to_vec()),
            ])
        }
    }

    /// Hash binding the operation to one entry point on one chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let op_hash = keccak256(self.encode(true));
        H256(keccak256(encode(&[
            Token::FixedBytes(op_hash.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ])))
    }

    pub fn verification_gas_limit(&self) -> u128 {
        unpack_uint128_pair(self.account_gas_limits).0
    }

    pub fn call_gas_limit(&self) -> u128 {
        unpack_uint128_pair(self.account_gas_limits).1
    }

    pub fn max_priority_fee_per_gas(&self) -> u128 {
        unpack_uint128_pair(self.gas_fees).0
    }

    pub fn max_fee_per_gas(&self) -> u128 {
        unpack_uint128_pair(self.gas_fees).1
    }

    /// Sponsor address and its verification/post-op gas limits, if a sponsor is set.
    pub fn paymaster_gas_limits(&self) -> Result<Option<(Address, u128, u128)>, EncodingError> {
        let data = &self.paymaster_and_data;
        if data.is_empty() {
            return Ok(None);
        }
        if data.len() < PAYMASTER_DATA_OFFSET {
            return Err(EncodingError::TooShort {
                what: "paymasterAndData",
                min: PAYMASTER_DATA_OFFSET,
                actual: data.len(),
            });
        }
        let paymaster = Address::from_slice(&data[..PAYMASTER_VALIDATION_GAS_OFFSET]);
        Ok(Some((
            paymaster,
            read_uint128(data, PAYMASTER_VALIDATION_GAS_OFFSET),
            read_uint128(data, PAYMASTER_POSTOP_GAS_OFFSET),
        )))
    }

    pub fn paymaster(&self) -> Option<Address> {
        self.paymaster_gas_limits().ok().flatten().map(|(paymaster, _, _)| paymaster)
    }

    /// Worst-case cost the payer must have deposited before validation.
    pub fn required_prefund(&self) -> Result<U256, EncodingError> {
        let (pm_verification, pm_post_op) = match self.paymaster_gas_limits()? {
            Some((_, verification, post_op)) => (verification, post_op),
            None => (0, 0),
        };
        let required_gas = U256::from(self.verification_gas_limit())
            + U256::from(self.call_gas_limit())
            + U256::from(pm_verification)
            + U256::from(pm_post_op);
        Ok(required_gas
            .saturating_add(self.pre_verification_gas)
            .saturating_mul(U256::from(self.max_fee_per_gas())))
    }

    pub fn gas_price(&self, base_fee: u128) -> u128 {
        let max_fee = self.max_fee_per_gas();
        let max_priority_fee = self.max_priority_fee_per_gas();
        if max_fee == max_priority_fee {
            return max_fee;
        }
        max_fee.min(max_priority_fee.saturating_add(base_fee))
    }
}
