// src/entry_point.rs
use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::aggregator::{PublicKeySource, SignatureAggregator};
use crate::bls::BlsPublicKey;
use crate::error::{
    AggregatorError, BlsError, EncodingError, ExecutionError, FailedOp, FailureKind, PaymasterError, StakeError,
};
use crate::gas::GasMeter;
use crate::nonce::NonceManager;
use crate::paymaster::{Paymaster, PostOpMode};
use crate::stake::{DepositInfo, StakeManager};
use crate::state::{CallRecord, WorldState};
use crate::types::{
    BlockEnv, HandleOpsOutcome, PackedUserOperation, UserOperation, UserOperationEvent,
    UserOperationRevertReason, UserOpsPerAggregator,
};
use crate::validation::{SignatureCheck, ValidationData, SIG_VALIDATION_FAILED};

pub const DEFAULT_UNUSED_GAS_PENALTY_PERCENT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointConfig {
    pub address: Address,
    pub chain_id: u64,
    /// Share of unused execution gas (call plus post-op limit) charged anyway.
    pub unused_gas_penalty_percent: u64,
}

impl EntryPointConfig {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self {
            address,
            chain_id,
            unused_gas_penalty_percent: DEFAULT_UNUSED_GAS_PENALTY_PERCENT,
        }
    }
}

#[derive(Clone, Default)]
struct AccountRegistry(HashMap<Address, Arc<dyn Account>>);

impl AccountRegistry {
    fn get(&self, address: Address) -> Option<Arc<dyn Account>> {
        self.0.get(&address).cloned()
    }
}

impl PublicKeySource for AccountRegistry {
    fn bls_public_key(&self, account: Address) -> Option<BlsPublicKey> {
        self.0.get(&account).and_then(|account| account.bls_public_key())
    }
}

/// Everything a batch may mutate. A batch works on a copy and commits it only on success.
#[derive(Debug, Clone, Default)]
struct Ledger {
    stakes: StakeManager,
    nonces: NonceManager,
    state: WorldState,
}

struct UserOpInfo<'a> {
    op_index: usize,
    user_op: &'a PackedUserOperation,
    user_op_hash: H256,
    account: Arc<dyn Account>,
    paymaster: Option<(Arc<dyn Paymaster>, u128)>,
    context: Bytes,
    prefund: U256,
    pre_op_gas: U256,
}

/// Admits batches of user operations: verifies every signature, deposit and nonce first and
/// only then executes the operations one by one.
pub struct EntryPoint {
    config: EntryPointConfig,
    accounts: AccountRegistry,
    paymasters: HashMap<Address, Arc<dyn Paymaster>>,
    aggregators: HashMap<Address, Arc<dyn SignatureAggregator>>,
    ledger: Ledger,
}

impl EntryPoint {
    pub fn new(config: EntryPointConfig) -> Self {
        info!(
            "Initialized entry point {:?} on chain {}",
            config.address, config.chain_id
        );
        Self {
            config,
            accounts: AccountRegistry::default(),
            paymasters: HashMap::new(),
            aggregators: HashMap::new(),
            ledger: Ledger::default(),
        }
    }

    pub fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    pub fn register_account(&mut self, account: impl Account + 'static) {
        self.accounts.0.insert(account.address(), Arc::new(account));
    }

    pub fn register_paymaster(&mut self, paymaster: impl Paymaster + 'static) {
        self.paymasters.insert(paymaster.address(), Arc::new(paymaster));
    }

    pub fn register_aggregator(&mut self, aggregator: impl SignatureAggregator + 'static) {
        self.aggregators
            .insert(aggregator.address(), Arc::new(aggregator));
    }

    pub fn get_user_op_hash(&self, user_op: &PackedUserOperation) -> H256 {
        user_op.hash(self.config.address, self.config.chain_id)
    }

    /// Sets the next nonce for the key in the upper bits of `user_op.nonce` and fills the
    /// remaining zero fields against the current base fee.
    pub fn fill_user_op(&self, mut user_op: UserOperation, env: &BlockEnv) -> UserOperation {
        user_op.nonce = self.get_nonce(user_op.sender, user_op.nonce >> 64);
        user_op.fill(env.base_fee)
    }

    pub fn deposit_to(&mut self, account: Address, amount: U256) -> U256 {
        self.ledger.stakes.deposit_to(account, amount)
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.ledger.stakes.balance_of(account)
    }

    pub fn get_deposit_info(&self, account: Address) -> DepositInfo {
        self.ledger.stakes.get_deposit_info(account)
    }

    pub fn add_stake(
        &mut self,
        account: Address,
        unstake_delay_sec: u32,
        value: U256,
    ) -> Result<(), StakeError> {
        self.ledger
            .stakes
            .add_stake(account, unstake_delay_sec, value)
    }

    pub fn unlock_stake(&mut self, account: Address, now: u64) -> Result<u64, StakeError> {
        self.ledger.stakes.unlock_stake(account, now)
    }

    /// Moves the unlocked stake of `account` to the balance of `withdraw_address`.
    pub fn withdraw_stake(
        &mut self,
        account: Address,
        withdraw_address: Address,
        now: u64,
    ) -> Result<U256, StakeError> {
        let stake = self.ledger.stakes.withdraw_stake(account, now)?;
        self.ledger.state.credit(withdraw_address, stake);
        Ok(stake)
    }

    pub fn withdraw_to(
        &mut self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        self.ledger.stakes.withdraw_to(account, amount)?;
        self.ledger.state.credit(withdraw_address, amount);
        Ok(())
    }

    pub fn get_nonce(&self, sender: Address, key: U256) -> U256 {
        self.ledger.nonces.get_nonce(sender, key)
    }

    pub fn increment_nonce(&mut self, sender: Address, key: U256) {
        self.ledger.nonces.increment_nonce(sender, key);
    }

    /// Credits spendable balance outside any batch.
    pub fn fund(&mut self, account: Address, amount: U256) {
        self.ledger.state.credit(account, amount);
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.ledger.state.balance_of(account)
    }

    pub fn executed_calls(&self) -> &[CallRecord] {
        self.ledger.state.calls()
    }

    /// Runs `user_ops` on the individual path, where every account checks its own signature.
    pub fn handle_ops(
        &mut self,
        user_ops: Vec<PackedUserOperation>,
        beneficiary: Address,
        env: BlockEnv,
    ) -> Result<HandleOpsOutcome, FailedOp> {
        self.handle_aggregated_ops(
            &[UserOpsPerAggregator::individual(user_ops)],
            beneficiary,
            env,
        )
    }

    /// Verifies every group and operation, then executes the operations in submission order
    /// and pays the collected fees to `beneficiary`.
    ///
    /// Any verification failure rejects the whole batch with no state change. Execution
    /// failures are isolated to their operation and reported in the outcome.
    pub fn handle_aggregated_ops(
        &mut self,
        groups: &[UserOpsPerAggregator],
        beneficiary: Address,
        env: BlockEnv,
    ) -> Result<HandleOpsOutcome, FailedOp> {
        let total: usize = groups.iter().map(|group| group.user_ops.len()).sum();
        info!(
            "Handling {} user ops in {} groups at timestamp {}",
            total,
            groups.len(),
            env.timestamp
        );

        self.verify_aggregated_signatures(groups)?;

        let mut ledger = self.ledger.clone();
        let mut infos = Vec::with_capacity(total);
        let mut op_index = 0;
        for group in groups {
            for user_op in &group.user_ops {
                infos.push(self.validate_prepayment(
                    &mut ledger,
                    op_index,
                    user_op,
                    group.aggregator,
                    &env,
                )?);
                op_index += 1;
            }
        }

        let mut outcome = HandleOpsOutcome::default();
        for op_info in &infos {
            let actual_gas_cost = self.execute_user_op(&mut ledger, op_info, &env, &mut outcome)?;
            outcome.collected = outcome.collected.saturating_add(actual_gas_cost);
        }

        ledger.state.credit(beneficiary, outcome.collected);
        info!(
            "Compensated beneficiary {:?} with {}",
            beneficiary, outcome.collected
        );
        self.ledger = ledger;
        Ok(outcome)
    }

    fn verify_aggregated_signatures(&self, groups: &[UserOpsPerAggregator]) -> Result<(), FailedOp> {
        let mut first_index = 0;
        for group in groups {
            let op_index = first_index;
            first_index += group.user_ops.len();
            let Some(aggregator_address) = group.aggregator else {
                continue;
            };
            if group.user_ops.is_empty() {
                continue;
            }
            let aggregator = self
                .aggregators
                .get(&aggregator_address)
                .filter(|_| aggregator_address != SIG_VALIDATION_FAILED)
                .ok_or_else(|| {
                    FailedOp::new(op_index, FailureKind::Signature, "AA96 invalid aggregator")
                })?;
            aggregator
                .validate_signatures(&self.accounts, &group.user_ops, &group.signature)
                .map_err(|err| {
                    warn!(
                        "Aggregator {:?} rejected {} ops: {}",
                        aggregator_address,
                        group.user_ops.len(),
                        err
                    );
                    let kind = match err {
                        AggregatorError::Bls(BlsError::Encoding(_)) => FailureKind::Encoding,
                        _ => FailureKind::Signature,
                    };
                    FailedOp::new(op_index, kind, format!("AA24 signature error: {err}"))
                })?;
            debug!(
                "Aggregator {:?} verified {} ops",
                aggregator_address,
                group.user_ops.len()
            );
        }
        Ok(())
    }

    fn validate_prepayment<'a>(
        &self,
        ledger: &mut Ledger,
        op_index: usize,
        user_op: &'a PackedUserOperation,
        aggregator: Option<Address>,
        env: &BlockEnv,
    ) -> Result<UserOpInfo<'a>, FailedOp> {
        let invalid_paymaster_data = |err: EncodingError| {
            FailedOp::new(
                op_index,
                FailureKind::Encoding,
                format!("AA93 invalid paymasterAndData: {err}"),
            )
        };
        let paymaster_limits = user_op
            .paymaster_gas_limits()
            .map_err(invalid_paymaster_data)?;
        let prefund = user_op.required_prefund().map_err(invalid_paymaster_data)?;
        let user_op_hash = self.get_user_op_hash(user_op);

        let account = self.accounts.get(user_op.sender).ok_or_else(|| {
            FailedOp::new(op_index, FailureKind::Validation, "AA20 account not deployed")
        })?;
        if !user_op.init_code.is_empty() {
            return Err(FailedOp::new(
                op_index,
                FailureKind::Validation,
                "AA10 sender already constructed",
            ));
        }
        let mut account_meter = GasMeter::new(user_op.verification_gas_limit());
        let account_validation = account
            .validate_user_op(user_op, user_op_hash, &mut account_meter)
            .map_err(|err| match err {
                ExecutionError::OutOfGas { .. } => FailedOp::new(
                    op_index,
                    FailureKind::Validation,
                    "AA26 over verificationGasLimit",
                ),
                ExecutionError::Encoding(err) => FailedOp::new(
                    op_index,
                    FailureKind::Encoding,
                    format!("AA24 signature error: {err}"),
                ),
                err => FailedOp::new(
                    op_index,
                    FailureKind::Validation,
                    format!("AA23 reverted: {err}"),
                ),
            })?;

        if paymaster_limits.is_none() {
            let didnt_pay = || FailedOp::new(op_index, FailureKind::Deposit, "AA21 didn't pay prefund");
            let missing = prefund.saturating_sub(ledger.stakes.balance_of(user_op.sender));
            if !missing.is_zero() {
                ledger
                    .state
                    .debit(user_op.sender, missing)
                    .map_err(|_| didnt_pay())?;
                ledger.stakes.deposit_to(user_op.sender, missing);
            }
            ledger
                .stakes
                .decrement_deposit(user_op.sender, prefund)
                .map_err(|_| didnt_pay())?;
        }

        if !ledger
            .nonces
            .validate_and_update_nonce(user_op.sender, user_op.nonce)
        {
            return Err(FailedOp::new(
                op_index,
                FailureKind::Nonce,
                "AA25 invalid account nonce",
            ));
        }

        let mut paymaster = None;
        let mut paymaster_validation = None;
        let mut paymaster_gas_used = 0;
        let mut context = Bytes::new();
        if let Some((paymaster_address, verification_gas_limit, post_op_gas_limit)) =
            paymaster_limits
        {
            let sponsor = self
                .paymasters
                .get(&paymaster_address)
                .cloned()
                .ok_or_else(|| {
                    FailedOp::new(op_index, FailureKind::Validation, "AA30 paymaster not deployed")
                })?;
            ledger
                .stakes
                .decrement_deposit(paymaster_address, prefund)
                .map_err(|_| {
                    FailedOp::new(op_index, FailureKind::Deposit, "AA31 paymaster deposit too low")
                })?;
            let mut meter = GasMeter::new(verification_gas_limit);
            let (paymaster_context, word) = sponsor
                .validate_paymaster_user_op(user_op, user_op_hash, prefund, &mut meter)
                .map_err(|err| match err {
                    PaymasterError::Execution(ExecutionError::OutOfGas { .. }) => FailedOp::new(
                        op_index,
                        FailureKind::Validation,
                        "AA36 over paymasterVerificationGasLimit",
                    ),
                    err => FailedOp::new(
                        op_index,
                        FailureKind::Validation,
                        format!("AA33 reverted: {err}"),
                    ),
                })?;
            paymaster_gas_used = meter.used();
            paymaster_validation = Some(ValidationData::parse(word));
            context = paymaster_context;
            paymaster = Some((sponsor, post_op_gas_limit));
        }

        check_validation_data(
            op_index,
            ValidationData::parse(account_validation),
            paymaster_validation,
            aggregator,
            env.timestamp,
        )?;

        let pre_op_gas = user_op
            .pre_verification_gas
            .saturating_add(U256::from(account_meter.used()))
            .saturating_add(U256::from(paymaster_gas_used));
        debug!(
            "Validated op {} from {:?}: prefund {}, pre-op gas {}",
            op_index, user_op.sender, prefund, pre_op_gas
        );
        Ok(UserOpInfo {
            op_index,
            user_op,
            user_op_hash,
            account,
            paymaster,
            context,
            prefund,
            pre_op_gas,
        })
    }

    /// Executes one verified operation against a checkpoint of the world state, settles its
    /// cost and returns the amount owed to the beneficiary.
    fn execute_user_op(
        &self,
        ledger: &mut Ledger,
        op_info: &UserOpInfo<'_>,
        env: &BlockEnv,
        outcome: &mut HandleOpsOutcome,
    ) -> Result<U256, FailedOp> {
        let user_op = op_info.user_op;
        let gas_price = user_op.gas_price(env.base_fee);
        let checkpoint = ledger.state.clone();

        let mut call_meter = GasMeter::new(user_op.call_gas_limit());
        let mut revert_reason = None;
        let mut mode = PostOpMode::OpSucceeded;
        if let Err(err) = op_info
            .account
            .execute(&user_op.call_data, &mut ledger.state, &mut call_meter)
        {
            ledger.state = checkpoint.clone();
            mode = PostOpMode::OpReverted;
            revert_reason = Some(err.to_string());
        }

        let mut execution_gas = U256::from(call_meter.used());
        let mut execution_gas_limit = U256::from(user_op.call_gas_limit());
        if let Some((paymaster, post_op_gas_limit)) = &op_info.paymaster {
            execution_gas_limit += U256::from(*post_op_gas_limit);
            if !op_info.context.is_empty() {
                let mut post_op_meter = GasMeter::new(*post_op_gas_limit);
                let cost_so_far = op_info
                    .pre_op_gas
                    .saturating_add(execution_gas)
                    .saturating_mul(U256::from(gas_price));
                if let Err(err) = paymaster.post_op(
                    mode,
                    &op_info.context,
                    cost_so_far,
                    gas_price,
                    &mut post_op_meter,
                ) {
                    ledger.state = checkpoint;
                    revert_reason = Some(format!("postOp reverted: {err}"));
                }
                execution_gas += U256::from(post_op_meter.used());
            }
        }

        let unused_gas_penalty = execution_gas_limit.saturating_sub(execution_gas)
            * U256::from(self.config.unused_gas_penalty_percent)
            / U256::from(100);
        let actual_gas_used = op_info
            .pre_op_gas
            .saturating_add(execution_gas)
            .saturating_add(unused_gas_penalty);
        let actual_gas_cost = actual_gas_used.saturating_mul(U256::from(gas_price));
        if actual_gas_cost > op_info.prefund {
            return Err(FailedOp::new(
                op_info.op_index,
                FailureKind::Deposit,
                "AA51 prefund below actualGasCost",
            ));
        }

        let paymaster_address = op_info
            .paymaster
            .as_ref()
            .map(|(paymaster, _)| paymaster.address());
        let payer = paymaster_address.unwrap_or(user_op.sender);
        ledger
            .stakes
            .deposit_to(payer, op_info.prefund - actual_gas_cost);

        let success = revert_reason.is_none();
        if let Some(reason) = revert_reason {
            warn!(
                "Op {} from {:?} reverted: {}",
                op_info.op_index, user_op.sender, reason
            );
            outcome.revert_reasons.push(UserOperationRevertReason {
                user_op_hash: op_info.user_op_hash,
                sender: user_op.sender,
                nonce: user_op.nonce,
                revert_reason: reason,
            });
        }
        info!(
            "Op {} from {:?} executed: success {}, gas {}, cost {}",
            op_info.op_index, user_op.sender, success, actual_gas_used, actual_gas_cost
        );
        outcome.events.push(UserOperationEvent {
            user_op_hash: op_info.user_op_hash,
            sender: user_op.sender,
            paymaster: paymaster_address,
            nonce: user_op.nonce,
            success,
            actual_gas_cost,
            actual_gas_used,
        });
        Ok(actual_gas_cost)
    }
}

/// Checks the signature authority and validity window returned by the account (and the
/// sponsor, if any) against the group the operation was submitted in.
fn check_validation_data(
    op_index: usize,
    account: ValidationData,
    paymaster: Option<ValidationData>,
    expected_aggregator: Option<Address>,
    now: u64,
) -> Result<(), FailedOp> {
    match (account.signature_check(), expected_aggregator) {
        (SignatureCheck::Individual, None) => {}
        (SignatureCheck::Aggregated(actual), Some(expected)) if actual == expected => {}
        (SignatureCheck::Aggregated(actual), None) => {
            debug!(
                "Op {} delegates to {:?} but was submitted unaggregated",
                op_index, actual
            );
            return Err(FailedOp::new(
                op_index,
                FailureKind::Signature,
                "AA24 signature error: delegated signature submitted on individual path",
            ));
        }
        _ => {
            return Err(FailedOp::new(
                op_index,
                FailureKind::Signature,
                "AA24 signature error",
            ))
        }
    }
    if !account.is_within(now) {
        return Err(FailedOp::new(
            op_index,
            FailureKind::TimeWindow,
            "AA22 expired or not due",
        ));
    }
    if let Some(paymaster) = paymaster {
        if !paymaster.aggregator.is_zero() {
            return Err(FailedOp::new(
                op_index,
                FailureKind::Signature,
                "AA34 signature error",
            ));
        }
        if !paymaster.is_within(now) {
            return Err(FailedOp::new(
                op_index,
                FailureKind::TimeWindow,
                "AA32 paymaster expired or not due",
            ));
        }
    }
    Ok(())
}
