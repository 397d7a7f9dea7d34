//! Gas schedule and metering

use crate::error::{EvmError, EvmResult};
use std::cell::Cell;
use xledger_primitives::Gas;

/// Default gas prices
pub mod cost {
    /// Charged for every executed instruction
    pub const BASE_OP: u64 = 0;
    /// Charged for every push, pop, dup and swap
    pub const STACK_OP: u64 = 1;
    /// SHA3 flat cost
    pub const SHA3: u64 = 1;
    /// Account lookup (BALANCE, EXTCODE*, CALL family, SELFDESTRUCT)
    pub const GET_ACCOUNT: u64 = 1;
    /// SSTORE
    pub const STORAGE_UPDATE: u64 = 1;
    /// Account creation (CREATE family, implicit creation on SELFDESTRUCT)
    pub const CREATE_ACCOUNT: u64 = 1;
    /// Per newly allocated 32-byte word of linear memory
    pub const MEMORY_WORD: u64 = 0;
    /// Per 32-byte word moved by the *COPY opcodes
    pub const COPY_WORD: u64 = 0;
}

/// Injected gas price table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct GasSchedule {
    /// Charged for every executed instruction
    pub base_op: Gas,
    /// Charged for every push, pop, dup and swap
    pub stack_op: Gas,
    /// SHA3 flat cost
    pub sha3: Gas,
    /// Account lookup
    pub get_account: Gas,
    /// SSTORE
    pub storage_update: Gas,
    /// Account creation
    pub create_account: Gas,
    /// Per newly allocated memory word
    pub memory_word: Gas,
    /// Per copied word
    pub copy_word: Gas,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base_op: cost::BASE_OP,
            stack_op: cost::STACK_OP,
            sha3: cost::SHA3,
            get_account: cost::GET_ACCOUNT,
            storage_update: cost::STORAGE_UPDATE,
            create_account: cost::CREATE_ACCOUNT,
            memory_word: cost::MEMORY_WORD,
            copy_word: cost::COPY_WORD,
        }
    }
}

impl GasSchedule {
    /// Cost of copying `len` bytes
    pub fn copy_gas(&self, len: u64) -> Gas {
        words(len).saturating_mul(self.copy_word)
    }
}

/// Number of 32-byte words needed to hold `len` bytes
pub fn words(len: u64) -> u64 {
    len.div_ceil(32)
}

/// Remaining gas of one invocation.
///
/// Shared by reference between the stack, memory and interpreter, so it
/// uses interior mutability.
#[derive(Debug)]
pub struct GasMeter {
    remaining: Cell<Gas>,
}

impl GasMeter {
    /// Meter holding `gas`
    pub fn new(gas: Gas) -> Self {
        Self {
            remaining: Cell::new(gas),
        }
    }

    /// Gas left
    pub fn remaining(&self) -> Gas {
        self.remaining.get()
    }

    /// Deduct `amount`; fails without deducting if not enough is left.
    pub fn consume(&self, amount: Gas) -> EvmResult<()> {
        let remaining = self.remaining.get();
        if remaining < amount {
            return Err(EvmError::InsufficientGas);
        }
        self.remaining.set(remaining - amount);
        Ok(())
    }

    /// Credit back unused gas
    pub fn refund(&self, amount: Gas) {
        self.remaining.set(self.remaining.get().saturating_add(amount));
    }

    /// Gas to forward to a nested call. A request above what is left is
    /// capped to all but one 64th of the remainder.
    pub fn call_gas(&self, requested: Gas) -> Gas {
        let remaining = self.remaining.get();
        if requested > remaining {
            remaining - remaining / 64
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = GasSchedule::default();
        assert_eq!(schedule.base_op, 0);
        assert_eq!(schedule.stack_op, 1);
        assert_eq!(schedule.storage_update, 1);
        assert_eq!(schedule.copy_gas(100), 0);
    }

    #[test]
    fn test_copy_gas_rounds_up() {
        let schedule = GasSchedule {
            copy_word: 3,
            ..GasSchedule::default()
        };
        assert_eq!(schedule.copy_gas(0), 0);
        assert_eq!(schedule.copy_gas(1), 3);
        assert_eq!(schedule.copy_gas(32), 3);
        assert_eq!(schedule.copy_gas(33), 6);
    }

    #[test]
    fn test_consume_exact() {
        let meter = GasMeter::new(10);
        assert!(meter.consume(10).is_ok());
        assert_eq!(meter.remaining(), 0);
        assert!(meter.consume(0).is_ok());
    }

    #[test]
    fn test_consume_insufficient_leaves_remaining() {
        let meter = GasMeter::new(5);
        assert_eq!(meter.consume(6), Err(EvmError::InsufficientGas));
        assert_eq!(meter.remaining(), 5);
    }

    #[test]
    fn test_refund() {
        let meter = GasMeter::new(5);
        meter.consume(5).unwrap();
        meter.refund(3);
        assert_eq!(meter.remaining(), 3);
    }

    #[test]
    fn test_call_gas_all_but_one_64th() {
        let meter = GasMeter::new(6400);
        assert_eq!(meter.call_gas(100), 100);
        assert_eq!(meter.call_gas(6400), 6400);
        assert_eq!(meter.call_gas(6401), 6300);
        assert_eq!(meter.call_gas(u64::MAX), 6300);
    }
}
