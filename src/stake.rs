// src/stake.rs
use std::collections::HashMap;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::StakeError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    pub deposit: U256,
    pub staked: bool,
    pub stake: U256,
    pub unstake_delay_sec: u32,
    pub withdraw_time: u64,
}

/// Pre-funded deposits that pay for operations, plus locked stake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeManager {
    deposits: HashMap<Address, DepositInfo>,
}

impl StakeManager {
    pub fn get_deposit_info(&self, account: Address) -> DepositInfo {
        self.deposits.get(&account).cloned().unwrap_or_default()
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.deposits
            .get(&account)
            .map(|info| info.deposit)
            .unwrap_or_default()
    }

    pub fn deposit_to(&mut self, account: Address, amount: U256) -> U256 {
        let info = self.deposits.entry(account).or_default();
        info.deposit = info.deposit.saturating_add(amount);
        info.deposit
    }

    pub(crate) fn decrement_deposit(
        &mut self,
        account: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        let info = self
            .deposits
            .get_mut(&account)
            .ok_or(StakeError::InsufficientDeposit)?;
        info.deposit = info
            .deposit
            .checked_sub(amount)
            .ok_or(StakeError::InsufficientDeposit)?;
        Ok(())
    }

    /// Adds `value` to the locked stake. The unstake delay may only grow.
    pub fn add_stake(
        &mut self,
        account: Address,
        unstake_delay_sec: u32,
        value: U256,
    ) -> Result<(), StakeError> {
        let info = self.deposits.entry(account).or_default();
        if unstake_delay_sec == 0 {
            return Err(StakeError::ZeroUnstakeDelay);
        }
        if unstake_delay_sec < info.unstake_delay_sec {
            return Err(StakeError::DecreasedUnstakeDelay);
        }
        let stake = info.stake.saturating_add(value);
        if stake.is_zero() {
            return Err(StakeError::NoStake);
        }
        info.stake = stake;
        info.staked = true;
        info.unstake_delay_sec = unstake_delay_sec;
        info.withdraw_time = 0;
        Ok(())
    }

    /// Starts the unstake delay. Returns the time at which the stake can be withdrawn.
    pub fn unlock_stake(&mut self, account: Address, now: u64) -> Result<u64, StakeError> {
        let info = self.deposits.get_mut(&account).ok_or(StakeError::NotStaked)?;
        if info.unstake_delay_sec == 0 {
            return Err(StakeError::NotStaked);
        }
        if !info.staked {
            return Err(StakeError::AlreadyUnstaking);
        }
        info.withdraw_time = now + u64::from(info.unstake_delay_sec);
        info.staked = false;
        Ok(info.withdraw_time)
    }

    /// Releases the whole stake once the delay has passed and returns the amount.
    pub fn withdraw_stake(&mut self, account: Address, now: u64) -> Result<U256, StakeError> {
        let info = self
            .deposits
            .get_mut(&account)
            .ok_or(StakeError::NoStakeToWithdraw)?;
        if info.stake.is_zero() {
            return Err(StakeError::NoStakeToWithdraw);
        }
        if info.withdraw_time == 0 {
            return Err(StakeError::StillLocked);
        }
        if info.withdraw_time > now {
            return Err(StakeError::WithdrawalNotDue);
        }
        let stake = info.stake;
        info.unstake_delay_sec = 0;
        info.withdraw_time = 0;
        info.stake = U256::zero();
        Ok(stake)
    }

    pub fn withdraw_to(&mut self, account: Address, amount: U256) -> Result<(), StakeError> {
        if amount > self.balance_of(account) {
            return Err(StakeError::InsufficientDeposit);
        }
        self.decrement_deposit(account, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_and_withdraw() {
        let account = Address::repeat_byte(1);
        let mut stakes = StakeManager::default();
        assert_eq!(stakes.deposit_to(account, U256::from(100)), U256::from(100));
        assert_eq!(stakes.deposit_to(account, U256::from(50)), U256::from(150));
        assert_eq!(
            stakes.withdraw_to(account, U256::from(151)),
            Err(StakeError::InsufficientDeposit)
        );
        stakes.withdraw_to(account, U256::from(150)).unwrap();
        assert_eq!(stakes.balance_of(account), U256::zero());
    }

    #[test]
    fn test_stake_lifecycle() {
        let account = Address::repeat_byte(2);
        let mut stakes = StakeManager::default();
        assert_eq!(
            stakes.add_stake(account, 0, U256::from(1)),
            Err(StakeError::ZeroUnstakeDelay)
        );
        assert_eq!(stakes.add_stake(account, 2, U256::zero()), Err(StakeError::NoStake));
        stakes.add_stake(account, 2, U256::from(1000)).unwrap();
        assert_eq!(
            stakes.add_stake(account, 1, U256::from(1)),
            Err(StakeError::DecreasedUnstakeDelay)
        );
        assert_eq!(stakes.withdraw_stake(account, 10), Err(StakeError::StillLocked));

        assert_eq!(stakes.unlock_stake(account, 100), Ok(102));
        assert_eq!(stakes.unlock_stake(account, 100), Err(StakeError::AlreadyUnstaking));
        assert_eq!(stakes.withdraw_stake(account, 101), Err(StakeError::WithdrawalNotDue));
        assert_eq!(stakes.withdraw_stake(account, 102), Ok(U256::from(1000)));

        let info = stakes.get_deposit_info(account);
        assert!(!info.staked);
        assert!(info.stake.is_zero());
        assert_eq!(
            stakes.withdraw_stake(account, 200),
            Err(StakeError::NoStakeToWithdraw)
        );
    }
}
