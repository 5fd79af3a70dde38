// src/account.rs
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;
use tracing::debug;

use crate::bls::{hash_to_point, verify_single, BlsDomain, BlsPublicKey, BlsSignature};
use crate::error::ExecutionError;
use crate::gas::GasMeter;
use crate::state::{CallRecord, WorldState};
use crate::types::PackedUserOperation;
use crate::user_op::call_data_cost;
use crate::validation::{ValidationData, SIG_VALIDATION_FAILED};

/// Fixed cost of entering account validation.
pub const VALIDATE_BASE_GAS: u128 = 5_000;
/// EIP-1108 pairing check with two pairs.
pub const PAIRING_CHECK_GAS: u128 = 45_000 + 2 * 34_000;
/// Cost of hashing a digest onto G1.
pub const HASH_TO_POINT_GAS: u128 = 30_000;
pub const CALL_BASE_GAS: u128 = 9_000;
pub const CALL_VALUE_GAS: u128 = 9_000;

/// A smart account as seen by the entry point.
pub trait Account: Send + Sync {
    fn address(&self) -> Address;

    /// Returns a packed validation-data word: the signature authority (zero, the failure
    /// marker, or an aggregator) and the validity window.
    fn validate_user_op(
        &self,
        user_op: &PackedUserOperation,
        user_op_hash: H256,
        meter: &mut GasMeter,
    ) -> Result<U256, ExecutionError>;

    /// Runs the operation's call payload. Errors leave `state` to be rolled back by the caller.
    fn execute(
        &self,
        call_data: &Bytes,
        state: &mut WorldState,
        meter: &mut GasMeter,
    ) -> Result<(), ExecutionError>;

    fn bls_public_key(&self) -> Option<BlsPublicKey> {
        None
    }
}

/// Builds `execute(address,uint256,bytes)` call data.
pub fn encode_execute(dest: Address, value: U256, func: Bytes) -> Bytes {
    let mut data = id("execute(address,uint256,bytes)").to_vec();
    data.extend(encode(&[
        Token::Address(dest),
        Token::Uint(value),
        Token::Bytes(func.to_vec()),
    ]));
    Bytes::from(data)
}

/// Account owned by a BLS key.
///
/// With an aggregator set, signature checking is delegated and `validate_user_op` just names
/// the aggregator. Without one the account verifies its own signature.
#[derive(Debug, Clone)]
pub struct BlsAccount {
    address: Address,
    public_key: BlsPublicKey,
    domain: BlsDomain,
    aggregator: Option<Address>,
    valid_after: u64,
    valid_until: u64,
}

impl BlsAccount {
    pub fn new(address: Address, public_key: BlsPublicKey, domain: BlsDomain) -> Self {
        Self {
            address,
            public_key,
            domain,
            aggregator: None,
            valid_after: 0,
            valid_until: 0,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Address) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_validity(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.valid_after = valid_after;
        self.valid_until = valid_until;
        self
    }

    pub fn aggregator(&self) -> Option<Address> {
        self.aggregator
    }

    /// A signature that does not decode to a G1 point is an encoding error, not a failed check.
    fn check_own_signature(
        &self,
        signature: &[u8],
        user_op_hash: H256,
    ) -> Result<bool, ExecutionError> {
        let signature = BlsSignature::from_bytes(signature)?;
        Ok(match hash_to_point(&self.domain, user_op_hash.as_bytes()) {
            Ok(message) => verify_single(&signature, &message, &self.public_key),
            Err(_) => false,
        })
    }
}

impl Account for BlsAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn validate_user_op(
        &self,
        user_op: &PackedUserOperation,
        user_op_hash: H256,
        meter: &mut GasMeter,
    ) -> Result<U256, ExecutionError> {
        meter.charge(VALIDATE_BASE_GAS)?;
        let authority = match self.aggregator {
            Some(aggregator) => aggregator,
            None => {
                meter.charge(HASH_TO_POINT_GAS + PAIRING_CHECK_GAS)?;
                if self.check_own_signature(&user_op.signature, user_op_hash)? {
                    Address::zero()
                } else {
                    debug!("Own signature check failed for {:?}", self.address);
                    SIG_VALIDATION_FAILED
                }
            }
        };
        Ok(ValidationData::new(authority, self.valid_after, self.valid_until).pack())
    }

    fn execute(
        &self,
        call_data: &Bytes,
        state: &mut WorldState,
        meter: &mut GasMeter,
    ) -> Result<(), ExecutionError> {
        if call_data.is_empty() {
            return Ok(());
        }
        let selector = id("execute(address,uint256,bytes)");
        if call_data.len() < 4 || call_data[..4] != selector {
            let shown = &call_data[..call_data.len().min(4)];
            return Err(ExecutionError::UnknownSelector(hex::encode(shown)));
        }
        meter.charge(CALL_BASE_GAS + call_data_cost(call_data))?;

        let tokens = decode(
            &[ParamType::Address, ParamType::Uint(256), ParamType::Bytes],
            &call_data[4..],
        )
        .map_err(|e| ExecutionError::MalformedCallData(e.to_string()))?;
        let mut tokens = tokens.into_iter();
        let (dest, value, func) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(Token::Address(dest)), Some(Token::Uint(value)), Some(Token::Bytes(func))) => {
                (dest, value, func)
            }
            _ => {
                return Err(ExecutionError::MalformedCallData(
                    "expected (address,uint256,bytes)".to_string(),
                ))
            }
        };

        if !value.is_zero() {
            meter.charge(CALL_VALUE_GAS)?;
        }
        state.transfer(self.address, dest, value)?;
        state.record_call(CallRecord {
            from: self.address,
            to: dest,
            value,
            data: Bytes::from(func),
        });
        Ok(())
    }

    fn bls_public_key(&self) -> Option<BlsPublicKey> {
        Some(self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::BlsSecretKey;
    use crate::error::EncodingError;
    use crate::validation::SignatureCheck;
    use ethers::utils::keccak256;

    fn setup() -> (BlsSecretKey, BlsAccount) {
        let sk = BlsSecretKey::from_bytes(&keccak256(b"account-owner")).unwrap();
        let account = BlsAccount::new(Address::repeat_byte(0xa1), sk.public_key(), BlsDomain::default());
        (sk, account)
    }

    #[test]
    fn test_own_signature_validation() {
        let (sk, account) = setup();
        let hash = H256::repeat_byte(0x33);
        let mut op = PackedUserOperation {
            sender: account.address(),
            ..Default::default()
        };
        op.signature = Bytes::from(
            sk.sign(&BlsDomain::default(), hash.as_bytes())
                .unwrap()
                .to_bytes()
                .to_vec(),
        );

        let mut meter = GasMeter::new(1_000_000);
        let word = account.validate_user_op(&op, hash, &mut meter).unwrap();
        assert_eq!(ValidationData::parse(word).signature_check(), SignatureCheck::Individual);
        assert_eq!(meter.used(), VALIDATE_BASE_GAS + HASH_TO_POINT_GAS + PAIRING_CHECK_GAS);

        let word = account
            .validate_user_op(&op, H256::repeat_byte(0x34), &mut GasMeter::new(1_000_000))
            .unwrap();
        assert_eq!(ValidationData::parse(word).signature_check(), SignatureCheck::Unsigned);

        op.signature = Bytes::from(vec![1, 2, 3]);
        assert_eq!(
            account.validate_user_op(&op, hash, &mut GasMeter::new(1_000_000)),
            Err(ExecutionError::Encoding(EncodingError::InvalidLength {
                what: "signature",
                expected: 64,
                actual: 3,
            }))
        );
    }

    #[test]
    fn test_delegating_account_names_aggregator() {
        let (_, account) = setup();
        let aggregator = Address::repeat_byte(0xbb);
        let account = account.with_aggregator(aggregator).with_validity(10, 20);
        let word = account
            .validate_user_op(&PackedUserOperation::default(), H256::zero(), &mut GasMeter::new(10_000))
            .unwrap();
        assert_eq!(ValidationData::parse(word), ValidationData::new(aggregator, 10, 20));
    }

    #[test]
    fn test_validation_out_of_gas() {
        let (_, account) = setup();
        let result = account.validate_user_op(
            &PackedUserOperation::default(),
            H256::zero(),
            &mut GasMeter::new(VALIDATE_BASE_GAS + 1),
        );
        assert!(matches!(result, Err(ExecutionError::OutOfGas { .. })));
    }

    #[test]
    fn test_execute_transfers_and_records() {
        let (_, account) = setup();
        let dest = Address::repeat_byte(0xde);
        let mut state = WorldState::default();
        state.credit(account.address(), U256::from(1_000));

        let call = encode_execute(dest, U256::from(400), Bytes::from(vec![0xca, 0xfe]));
        let mut meter = GasMeter::new(100_000);
        account.execute(&call, &mut state, &mut meter).unwrap();
        assert_eq!(state.balance_of(dest), U256::from(400));
        assert_eq!(state.calls().len(), 1);
        assert_eq!(state.calls()[0].data, Bytes::from(vec![0xca, 0xfe]));
        assert_eq!(meter.used(), CALL_BASE_GAS + call_data_cost(&call) + CALL_VALUE_GAS);

        let too_much = encode_execute(dest, U256::from(601), Bytes::new());
        assert!(matches!(
            account.execute(&too_much, &mut state, &mut GasMeter::new(100_000)),
            Err(ExecutionError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            account.execute(&Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]), &mut state, &mut GasMeter::new(100_000)),
            Err(ExecutionError::UnknownSelector(sel)) if sel == "deadbeef"
        ));
    }
}
