// src/nonce.rs
use std::collections::HashMap;

use ethers::types::{Address, U256};

/// Two-dimensional replay protection: the upper 192 bits of a nonce select a key and the
/// lower 64 bits must equal that key's next sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonceManager {
    sequences: HashMap<(Address, U256), u64>,
}

impl NonceManager {
    pub fn get_nonce(&self, sender: Address, key: U256) -> U256 {
        let sequence = self.sequences.get(&(sender, key)).copied().unwrap_or(0);
        (key << 64) | U256::from(sequence)
    }

    /// Bumps the sequence of `key` for `sender` without an operation.
    pub fn increment_nonce(&mut self, sender: Address, key: U256) {
        *self.sequences.entry((sender, key)).or_insert(0) += 1;
    }

    /// Returns false if `nonce` is not the next one for its key; the sequence only advances
    /// on success.
    pub fn validate_and_update_nonce(&mut self, sender: Address, nonce: U256) -> bool {
        let key = nonce >> 64;
        let sequence = nonce.low_u64();
        let current = self.sequences.get(&(sender, key)).copied().unwrap_or(0);
        if current != sequence {
            return false;
        }
        self.sequences.insert((sender, key), current + 1);
        true
    }
}
