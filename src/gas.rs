// src/gas.rs
use crate::error::ExecutionError;

/// Gas budget for one validation or execution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u128,
    used: u128,
}

impl GasMeter {
    pub fn new(limit: u128) -> Self {
        Self { limit, used: 0 }
    }

    /// Consumes `amount`. On failure the meter is left exhausted.
    pub fn charge(&mut self, amount: u128) -> Result<(), ExecutionError> {
        match self.used.checked_add(amount) {
            Some(total) if total <= self.limit => {
                self.used = total;
                Ok(())
            }
            _ => {
                self.used = self.limit;
                Err(ExecutionError::OutOfGas { limit: self.limit })
            }
        }
    }

    pub fn used(&self) -> u128 {
        self.used
    }

    pub fn remaining(&self) -> u128 {
        self.limit - self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_within_limit() {
        let mut meter = GasMeter::new(100);
        meter.charge(40).unwrap();
        meter.charge(60).unwrap();
        assert_eq!(meter.used(), 100);
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn test_out_of_gas_exhausts_meter() {
        let mut meter = GasMeter::new(100);
        meter.charge(30).unwrap();
        assert_eq!(meter.charge(71), Err(ExecutionError::OutOfGas { limit: 100 }));
        assert_eq!(meter.used(), 100);
        assert!(meter.charge(u128::MAX).is_err());
    }
}
