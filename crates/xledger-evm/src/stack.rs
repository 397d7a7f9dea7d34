//! Gas-metered operand stack

use crate::error::EvmError;
use crate::gas::GasMeter;
use crate::math::I256;
use crate::sink::ErrorSink;
use primitive_types::U256;
use xledger_primitives::{Address, Gas, Word};

/// Largest depth the stack can ever reach, whatever the configured maximum
const ABSOLUTE_MAX_DEPTH: u64 = i32::MAX as u64;

/// Operand stack of one contract invocation.
///
/// Every operation charges `stack_op` gas first. Failures are recorded in
/// the shared [`ErrorSink`] and the operation then does nothing, returning
/// the zero word where a value is expected.
#[derive(Debug)]
pub struct Stack<'a> {
    data: Vec<Word>,
    max_depth: u64,
    stack_op: Gas,
    gas: &'a GasMeter,
    sink: &'a ErrorSink,
}

impl<'a> Stack<'a> {
    /// Create an empty stack. A `max_depth` of zero means no limit other
    /// than the 32-bit index bound.
    pub fn new(
        sink: &'a ErrorSink,
        gas: &'a GasMeter,
        stack_op: Gas,
        initial_capacity: usize,
        max_depth: u64,
    ) -> Self {
        Self {
            data: Vec::with_capacity(initial_capacity),
            max_depth,
            stack_op,
            gas,
            sink,
        }
    }

    /// Current depth
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Push a word
    pub fn push(&mut self, word: Word) {
        if !self.use_gas() {
            return;
        }
        self.push_unmetered(word);
    }

    /// Pop a word
    pub fn pop(&mut self) -> Word {
        if !self.use_gas() {
            return Word::ZERO;
        }
        match self.data.pop() {
            Some(word) => word,
            None => {
                self.sink.push_error(EvmError::DataStackUnderflow);
                Word::ZERO
            }
        }
    }

    /// Push a copy of the `n`th item (1 = top)
    pub fn dup(&mut self, n: usize) {
        if !self.use_gas() {
            return;
        }
        if n == 0 || self.data.len() < n {
            self.sink.push_error(EvmError::DataStackUnderflow);
            return;
        }
        let word = self.data[self.data.len() - n];
        self.push(word);
    }

    /// Exchange the top with the item `n` below it (SWAPn)
    pub fn swap(&mut self, n: usize) {
        if !self.use_gas() {
            return;
        }
        let len = self.data.len();
        if n == 0 || len <= n {
            self.sink.push_error(EvmError::DataStackUnderflow);
            return;
        }
        self.data.swap(len - 1, len - 1 - n);
    }

    /// Top of the stack without removing it. Costs no gas.
    pub fn peek(&self) -> Word {
        match self.data.last() {
            Some(word) => *word,
            None => {
                self.sink.push_error(EvmError::DataStackUnderflow);
                Word::ZERO
            }
        }
    }

    /// Push an unsigned integer
    pub fn push_u256(&mut self, value: U256) {
        self.push(Word::from_u256(value));
    }

    /// Pop an unsigned integer
    pub fn pop_u256(&mut self) -> U256 {
        self.pop().to_u256()
    }

    /// Push a signed integer in twos-complement encoding
    pub fn push_i256(&mut self, value: I256) {
        self.push_u256(value.to_u256());
    }

    /// Pop a word as a signed integer
    pub fn pop_i256(&mut self) -> I256 {
        I256::from_u256(self.pop_u256())
    }

    /// Push a 64-bit integer
    pub fn push64(&mut self, value: u64) {
        self.push(Word::from_u64(value));
    }

    /// Pop a 64-bit integer; non-zero high bytes record `IntegerOverflow`.
    pub fn pop64(&mut self) -> u64 {
        let word = self.pop();
        match word.to_u64() {
            Some(value) => value,
            None => {
                self.sink.push_error(EvmError::IntegerOverflow);
                0
            }
        }
    }

    /// Push 1 or 0
    pub fn push_bool(&mut self, value: bool) {
        self.push(if value { Word::ONE } else { Word::ZERO });
    }

    /// Push an address left-padded into a word
    pub fn push_address(&mut self, address: Address) {
        self.push(address.to_word());
    }

    /// Pop a word and keep its low 20 bytes
    pub fn pop_address(&mut self) -> Address {
        Address::from_word(&self.pop())
    }

    fn push_unmetered(&mut self, word: Word) {
        let depth = self.data.len() as u64 + 1;
        if depth > ABSOLUTE_MAX_DEPTH || (self.max_depth > 0 && depth > self.max_depth) {
            self.sink.push_error(EvmError::DataStackOverflow);
            return;
        }
        self.data.push(word);
    }

    fn use_gas(&self) -> bool {
        match self.gas.consume(self.stack_op) {
            Ok(()) => true,
            Err(err) => {
                self.sink.push_error(err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn word(n: u64) -> Word {
        Word::from_u64(n)
    }

    #[test]
    fn test_push_pop() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 1, 16, 0);

        stack.push(word(1));
        stack.push(word(2));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), word(2));
        assert_eq!(stack.pop(), word(1));
        assert!(stack.is_empty());
        assert!(!sink.is_err());
        assert_eq!(gas.remaining(), 96);
    }

    #[test]
    fn test_pop_empty_underflows() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 1, 16, 0);

        assert_eq!(stack.pop(), Word::ZERO);
        assert_eq!(sink.error(), Some(EvmError::DataStackUnderflow));
    }

    #[test]
    fn test_overflow_at_max_depth() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 1, 2, 2);

        stack.push(word(1));
        stack.push(word(2));
        assert!(!sink.is_err());
        stack.push(word(3));
        assert_eq!(sink.error(), Some(EvmError::DataStackOverflow));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_out_of_gas_is_noop() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(1);
        let mut stack = Stack::new(&sink, &gas, 1, 4, 0);

        stack.push(word(7));
        stack.push(word(8));
        assert_eq!(stack.len(), 1);
        assert_eq!(sink.error(), Some(EvmError::InsufficientGas));
        assert_eq!(stack.pop(), Word::ZERO);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_dup() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 0, 4, 0);

        stack.push(word(1));
        stack.push(word(2));
        stack.dup(2);
        assert_eq!(stack.peek(), word(1));
        assert_eq!(stack.len(), 3);

        stack.dup(4);
        assert_eq!(sink.error(), Some(EvmError::DataStackUnderflow));
    }

    #[test]
    fn test_swap() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 0, 4, 0);

        stack.push(word(1));
        stack.push(word(2));
        stack.push(word(3));
        stack.swap(2);
        assert_eq!(stack.pop(), word(1));
        assert_eq!(stack.pop(), word(2));
        assert_eq!(stack.pop(), word(3));

        stack.push(word(1));
        stack.swap(1);
        assert_eq!(sink.error(), Some(EvmError::DataStackUnderflow));
    }

    #[test]
    fn test_pop64_overflow() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 0, 4, 0);

        stack.push64(u64::MAX);
        assert_eq!(stack.pop64(), u64::MAX);
        assert!(!sink.is_err());

        stack.push_u256(U256::from(u64::MAX) + U256::one());
        assert_eq!(stack.pop64(), 0);
        assert_eq!(sink.error(), Some(EvmError::IntegerOverflow));
    }

    #[test]
    fn test_signed_push_is_twos_complement() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 0, 4, 0);

        stack.push_i256(I256::new(true, U256::one()));
        assert_eq!(stack.peek(), Word::from_bytes([0xFF; 32]));
        let value = stack.pop_i256();
        assert!(value.is_negative());
        assert_eq!(value.magnitude(), U256::one());
    }

    #[test]
    fn test_address_roundtrip() {
        let sink = ErrorSink::new();
        let gas = GasMeter::new(100);
        let mut stack = Stack::new(&sink, &gas, 0, 4, 0);
        let addr = Address::from_bytes([0x42; 20]);

        stack.push_address(addr);
        assert_eq!(stack.pop_address(), addr);
    }

    proptest! {
        #[test]
        fn prop_depth_is_pushes_minus_pops(pushes in 0usize..64, pops in 0usize..64) {
            let pops = pops.min(pushes);
            let sink = ErrorSink::new();
            let gas = GasMeter::new(u64::MAX);
            let mut stack = Stack::new(&sink, &gas, 1, 16, 1024);

            for i in 0..pushes {
                stack.push64(i as u64);
            }
            for _ in 0..pops {
                stack.pop();
            }
            prop_assert_eq!(stack.len(), pushes - pops);
            prop_assert!(!sink.is_err());
        }
    }
}
