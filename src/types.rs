// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// Off-chain form of a user operation. Must be packed before hashing or submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: u128,
    pub verification_gas_limit: u128,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub paymaster: Option<Address>,
    pub paymaster_verification_gas_limit: u128,
    pub paymaster_post_op_gas_limit: u128,
    pub paymaster_data: Bytes,
    pub signature: Bytes,
}

/// Wire form of a user operation.
///
/// `account_gas_limits` is `verificationGasLimit ‖ callGasLimit` and `gas_fees` is
/// `maxPriorityFeePerGas ‖ maxFeePerGas`, each half 16 bytes big-endian.
/// `paymaster_and_data` is `paymaster ‖ verificationGas(16) ‖ postOpGas(16) ‖ data`, or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub account_gas_limits: H256,
    pub pre_verification_gas: U256,
    pub gas_fees: H256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Operations that share one aggregator and one combined signature.
///
/// `aggregator == None` is the individual path: every account checks its own signature
/// and `signature` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpsPerAggregator {
    pub user_ops: Vec<PackedUserOperation>,
    pub aggregator: Option<Address>,
    pub signature: Bytes,
}

impl UserOpsPerAggregator {
    pub fn individual(user_ops: Vec<PackedUserOperation>) -> Self {
        Self {
            user_ops,
            aggregator: None,
            signature: Bytes::default(),
        }
    }

    pub fn aggregated(
        aggregator: Address,
        user_ops: Vec<PackedUserOperation>,
        signature: Bytes,
    ) -> Self {
        Self {
            user_ops,
            aggregator: Some(aggregator),
            signature,
        }
    }
}

/// Per-operation record emitted after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationEvent {
    pub user_op_hash: H256,
    pub sender: Address,
    pub paymaster: Option<Address>,
    pub nonce: U256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRevertReason {
    pub user_op_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    pub revert_reason: String,
}

/// Result of a successful `handleOps`/`handleAggregatedOps` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleOpsOutcome {
    pub events: Vec<UserOperationEvent>,
    pub revert_reasons: Vec<UserOperationRevertReason>,
    pub collected: U256,
}

/// Execution-time context of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEnv {
    pub timestamp: u64,
    pub base_fee: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_packed_user_operation_json_is_camel_case() {
        let user_op = PackedUserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(3),
            ..Default::default()
        };
        let value = serde_json::to_value(&user_op).unwrap();
        assert_eq!(value["sender"], json!("0x1111111111111111111111111111111111111111"));
        assert_eq!(value["nonce"], json!("0x3"));
        assert!(value.get("accountGasLimits").is_some());
        assert!(value.get("paymasterAndData").is_some());

        let parsed: PackedUserOperation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, user_op);
    }

    #[test]
    fn test_group_constructors() {
        let individual = UserOpsPerAggregator::individual(vec![PackedUserOperation::default()]);
        assert_eq!(individual.aggregator, None);
        assert!(individual.signature.is_empty());

        let aggregator = Address::repeat_byte(0xa9);
        let aggregated = UserOpsPerAggregator::aggregated(aggregator, vec![], Bytes::from(vec![1]));
        assert_eq!(aggregated.aggregator, Some(aggregator));
        assert_eq!(serde_json::to_value(&aggregated).unwrap()["userOps"], json!([]));
    }
}
