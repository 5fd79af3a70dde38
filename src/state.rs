// src/state.rs
use std::collections::HashMap;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// A call dispatched by an account during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Balances and the log of dispatched calls. Cloned as the checkpoint taken before each
/// operation executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    balances: HashMap<Address, U256>,
    calls: Vec<CallRecord>,
}

impl WorldState {
    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, account: Address, amount: U256) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn debit(&mut self, account: Address, amount: U256) -> Result<(), ExecutionError> {
        let available = self.balance_of(account);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ExecutionError::InsufficientBalance {
                needed: amount,
                available,
            })?;
        self.balances.insert(account, remaining);
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), ExecutionError> {
        self.debit(from, value)?;
        self.credit(to, value);
        Ok(())
    }

    pub fn record_call(&mut self, call: CallRecord) {
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_and_checkpoint() {
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let mut state = WorldState::default();
        state.credit(a, U256::from(10));
        let checkpoint = state.clone();

        state.transfer(a, b, U256::from(4)).unwrap();
        assert_eq!(state.balance_of(a), U256::from(6));
        assert_eq!(state.balance_of(b), U256::from(4));
        assert_eq!(
            state.transfer(a, b, U256::from(7)),
            Err(ExecutionError::InsufficientBalance {
                needed: U256::from(7),
                available: U256::from(6),
            })
        );

        state = checkpoint;
        assert_eq!(state.balance_of(a), U256::from(10));
        assert_eq!(state.balance_of(b), U256::zero());
    }
}
