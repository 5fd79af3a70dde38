// src/paymaster.rs
use std::collections::HashSet;

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use tracing::{debug, info};

use crate::error::PaymasterError;
use crate::gas::GasMeter;
use crate::types::PackedUserOperation;
use crate::validation::ValidationData;

pub const PAYMASTER_VALIDATE_GAS: u128 = 15_000;
pub const PAYMASTER_POST_OP_GAS: u128 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOpMode {
    OpSucceeded,
    OpReverted,
}

/// A sponsor that pays for operations out of its own deposit.
pub trait Paymaster: Send + Sync {
    fn address(&self) -> Address;

    /// Agrees to pay up to `max_cost`. Returns a context handed back to `post_op` (empty to
    /// skip the call) and a packed validation-data word.
    fn validate_paymaster_user_op(
        &self,
        user_op: &PackedUserOperation,
        user_op_hash: H256,
        max_cost: U256,
        meter: &mut GasMeter,
    ) -> Result<(Bytes, U256), PaymasterError>;

    fn post_op(
        &self,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
        actual_user_op_fee_per_gas: u128,
        meter: &mut GasMeter,
    ) -> Result<(), PaymasterError>;
}

/// Sponsors whitelisted senders up to a fixed cost per operation.
#[derive(Debug, Clone)]
pub struct SimplePaymaster {
    address: Address,
    whitelist: HashSet<Address>,
    max_cost: U256,
    valid_after: u64,
    valid_until: u64,
}

impl SimplePaymaster {
    pub fn new(address: Address, max_cost: U256) -> Self {
        info!("Initialized paymaster with address: {:?}", address);
        Self {
            address,
            whitelist: HashSet::new(),
            max_cost,
            valid_after: 0,
            valid_until: 0,
        }
    }

    pub fn set_whitelisted(&mut self, account: Address, whitelisted: bool) {
        if whitelisted {
            self.whitelist.insert(account);
        } else {
            self.whitelist.remove(&account);
        }
    }

    pub fn set_whitelisted_batch(&mut self, accounts: &[Address], whitelisted: bool) {
        for account in accounts {
            self.set_whitelisted(*account, whitelisted);
        }
    }

    pub fn is_whitelisted(&self, account: Address) -> bool {
        self.whitelist.contains(&account)
    }

    pub fn set_max_cost(&mut self, max_cost: U256) {
        self.max_cost = max_cost;
    }

    pub fn max_cost(&self) -> U256 {
        self.max_cost
    }

    /// Restricts sponsorship to `[valid_after, valid_until]`.
    pub fn set_validity(&mut self, valid_after: u64, valid_until: u64) {
        self.valid_after = valid_after;
        self.valid_until = valid_until;
    }
}

impl Paymaster for SimplePaymaster {
    fn address(&self) -> Address {
        self.address
    }

    fn validate_paymaster_user_op(
        &self,
        user_op: &PackedUserOperation,
        _user_op_hash: H256,
        max_cost: U256,
        meter: &mut GasMeter,
    ) -> Result<(Bytes, U256), PaymasterError> {
        meter.charge(PAYMASTER_VALIDATE_GAS)?;
        if user_op.max_fee_per_gas() == 0 {
            return Err(PaymasterError::InvalidUserOperation(
                "Gas price cannot be zero".to_string(),
            ));
        }
        if !self.is_whitelisted(user_op.sender) {
            return Err(PaymasterError::NotWhitelisted(user_op.sender));
        }
        if max_cost > self.max_cost {
            return Err(PaymasterError::MaxCostExceeded {
                requested: max_cost,
                limit: self.max_cost,
            });
        }
        let context = Bytes::from(encode(&[Token::Address(user_op.sender)]));
        let validation = ValidationData::new(Address::zero(), self.valid_after, self.valid_until);
        Ok((context, validation.pack()))
    }

    fn post_op(
        &self,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
        actual_user_op_fee_per_gas: u128,
        meter: &mut GasMeter,
    ) -> Result<(), PaymasterError> {
        meter.charge(PAYMASTER_POST_OP_GAS)?;
        let sender = decode(&[ParamType::Address], context)
            .ok()
            .and_then(|tokens| tokens.into_iter().next())
            .and_then(|token| token.into_address())
            .ok_or(PaymasterError::InvalidContext)?;
        debug!(
            "postOp {:?} for {:?}: cost {} at {} per gas",
            mode, sender, actual_gas_cost, actual_user_op_fee_per_gas
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::SignatureCheck;

    fn op_from(sender: Address) -> PackedUserOperation {
        crate::types::UserOperation {
            sender,
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 1,
            ..Default::default()
        }
        .pack()
    }

    #[test]
    fn test_whitelist_and_max_cost() {
        let sender = Address::repeat_byte(0x01);
        let mut paymaster = SimplePaymaster::new(Address::repeat_byte(0x99), U256::from(1_000));
        let op = op_from(sender);

        let err = paymaster
            .validate_paymaster_user_op(&op, H256::zero(), U256::from(10), &mut GasMeter::new(100_000))
            .unwrap_err();
        assert_eq!(err, PaymasterError::NotWhitelisted(sender));

        paymaster.set_whitelisted_batch(&[sender, Address::repeat_byte(0x02)], true);
        let (context, word) = paymaster
            .validate_paymaster_user_op(&op, H256::zero(), U256::from(1_000), &mut GasMeter::new(100_000))
            .unwrap();
        assert_eq!(context.len(), 32);
        assert_eq!(ValidationData::parse(word).signature_check(), SignatureCheck::Individual);

        let err = paymaster
            .validate_paymaster_user_op(&op, H256::zero(), U256::from(1_001), &mut GasMeter::new(100_000))
            .unwrap_err();
        assert!(matches!(err, PaymasterError::MaxCostExceeded { .. }));

        paymaster.set_whitelisted(sender, false);
        assert!(!paymaster.is_whitelisted(sender));
    }

    #[test]
    fn test_zero_gas_price_rejected() {
        let sender = Address::repeat_byte(0x01);
        let mut paymaster = SimplePaymaster::new(Address::repeat_byte(0x99), U256::from(1_000));
        paymaster.set_whitelisted(sender, true);
        let op = crate::types::UserOperation {
            sender,
            ..Default::default()
        }
        .pack();
        assert!(matches!(
            paymaster.validate_paymaster_user_op(&op, H256::zero(), U256::zero(), &mut GasMeter::new(100_000)),
            Err(PaymasterError::InvalidUserOperation(_))
        ));
    }

    #[test]
    fn test_post_op_requires_context() {
        let paymaster = SimplePaymaster::new(Address::repeat_byte(0x99), U256::from(1_000));
        let context = Bytes::from(encode(&[Token::Address(Address::repeat_byte(0x01))]));
        paymaster
            .post_op(PostOpMode::OpSucceeded, &context, U256::from(5), 1, &mut GasMeter::new(10_000))
            .unwrap();
        assert_eq!(
            paymaster.post_op(PostOpMode::OpReverted, &Bytes::from(vec![1]), U256::from(5), 1, &mut GasMeter::new(10_000)),
            Err(PaymasterError::InvalidContext)
        );
        assert!(matches!(
            paymaster.post_op(PostOpMode::OpSucceeded, &context, U256::from(5), 1, &mut GasMeter::new(10)),
            Err(PaymasterError::Execution(_))
        ));
    }
}
