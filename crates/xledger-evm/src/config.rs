//! Engine configuration

use crate::gas::GasSchedule;

/// Default initial capacity of the data stack
pub const DATA_STACK_INITIAL_CAPACITY: usize = 1024;

/// Default maximum depth of the data stack
pub const DATA_STACK_MAX_DEPTH: u64 = 1024;

/// Default memory ceiling (16 MiB)
pub const MEMORY_MAXIMUM_CAPACITY: u64 = 1 << 24;

/// Length the nonce is padded or truncated to when deriving CREATE addresses
pub const NONCE_LENGTH: usize = 32;

/// Execution options, fixed for the lifetime of an [`Evm`](crate::Evm)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct EvmOptions {
    /// Stack capacity reserved up front
    pub data_stack_initial_capacity: usize,
    /// Deepest the data stack may grow; 0 = unbounded
    pub data_stack_max_depth: u64,
    /// Deepest nested call chain; 0 = unbounded
    pub call_stack_max_depth: u64,
    /// Memory allocated up front, in bytes
    pub memory_initial_capacity: u64,
    /// Memory ceiling in bytes; 0 = the absolute maximum
    pub memory_maximum_capacity: u64,
    /// Per-transaction nonce mixed into CREATE addresses
    pub nonce: Vec<u8>,
    /// Gas prices
    pub gas: GasSchedule,
}

impl Default for EvmOptions {
    fn default() -> Self {
        Self {
            data_stack_initial_capacity: DATA_STACK_INITIAL_CAPACITY,
            data_stack_max_depth: DATA_STACK_MAX_DEPTH,
            call_stack_max_depth: 0,
            memory_initial_capacity: 0,
            memory_maximum_capacity: MEMORY_MAXIMUM_CAPACITY,
            nonce: Vec::new(),
            gas: GasSchedule::default(),
        }
    }
}

impl EvmOptions {
    /// Set the CREATE nonce
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the gas schedule
    pub fn with_gas_schedule(mut self, gas: GasSchedule) -> Self {
        self.gas = gas;
        self
    }

    /// Bound nested calls
    pub fn with_call_stack_max_depth(mut self, depth: u64) -> Self {
        self.call_stack_max_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EvmOptions::default();
        assert_eq!(options.data_stack_initial_capacity, 1024);
        assert_eq!(options.data_stack_max_depth, 1024);
        assert_eq!(options.call_stack_max_depth, 0);
        assert_eq!(options.memory_initial_capacity, 0);
        assert_eq!(options.memory_maximum_capacity, 16 * 1024 * 1024);
        assert!(options.nonce.is_empty());
        assert_eq!(options.gas, GasSchedule::default());
    }

    #[test]
    fn test_builders() {
        let options = EvmOptions::default()
            .with_nonce(vec![1, 2])
            .with_call_stack_max_depth(4);
        assert_eq!(options.nonce, vec![1, 2]);
        assert_eq!(options.call_stack_max_depth, 4);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_partial_options() {
        let options: EvmOptions =
            serde_json::from_str(r#"{"call_stack_max_depth": 8, "gas": {"sha3": 30}}"#).unwrap();
        assert_eq!(options.call_stack_max_depth, 8);
        assert_eq!(options.gas.sha3, 30);
        assert_eq!(options.gas.stack_op, GasSchedule::default().stack_op);
        assert_eq!(options.data_stack_max_depth, DATA_STACK_MAX_DEPTH);
    }
}
