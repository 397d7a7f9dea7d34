//! Bounded, zero-filled linear memory

use crate::error::EvmError;
use crate::gas::{words, GasMeter};
use crate::sink::ErrorSink;
use primitive_types::U256;
use xledger_primitives::Gas;

/// No validator may address memory beyond a 32-bit signed index
pub const ABSOLUTE_MAX_CAPACITY: u64 = i32::MAX as u64;

/// Growth quantum in bytes
const WORD_SIZE: u64 = 32;

/// Byte-addressable memory of one contract invocation.
///
/// Capacity only grows, in whole words, zero-filled. Accesses that would
/// exceed the maximum record `MemoryOutOfBounds` in the shared sink and
/// return nothing.
#[derive(Debug)]
pub struct Memory<'a> {
    data: Vec<u8>,
    maximum_capacity: u64,
    word_cost: Gas,
    gas: &'a GasMeter,
    sink: &'a ErrorSink,
}

impl<'a> Memory<'a> {
    /// Create memory with `initial_capacity` zero bytes. The maximum is
    /// clamped to [`ABSOLUTE_MAX_CAPACITY`], which is also what a maximum of
    /// zero means. The initial allocation is free.
    pub fn new(
        sink: &'a ErrorSink,
        gas: &'a GasMeter,
        word_cost: Gas,
        initial_capacity: u64,
        maximum_capacity: u64,
    ) -> Self {
        let maximum_capacity = match maximum_capacity {
            0 => ABSOLUTE_MAX_CAPACITY,
            max => max.min(ABSOLUTE_MAX_CAPACITY),
        };
        let initial = initial_capacity.min(maximum_capacity) as usize;
        Self {
            data: vec![0u8; initial],
            maximum_capacity,
            word_cost,
            gas,
            sink,
        }
    }

    /// Copy `length` bytes starting at `offset`, growing memory as needed
    pub fn read(&mut self, offset: U256, length: U256) -> Vec<u8> {
        let (offset, length) = match (to_u64(offset), to_u64(length)) {
            (Some(offset), Some(length)) => (offset, length),
            _ => {
                self.out_of_bounds(format!(
                    "read range {}+{} does not fit in 64 bits",
                    offset, length
                ));
                return Vec::new();
            }
        };
        if length == 0 {
            return Vec::new();
        }
        match self.ensure(offset, length) {
            Some(end) => self.data[offset as usize..end].to_vec(),
            None => Vec::new(),
        }
    }

    /// Write `value` at `offset`, growing memory as needed
    pub fn write(&mut self, offset: U256, value: &[u8]) {
        let offset = match to_u64(offset) {
            Some(offset) => offset,
            None => {
                self.out_of_bounds(format!("write offset {} does not fit in 64 bits", offset));
                return;
            }
        };
        if value.is_empty() {
            return;
        }
        if let Some(end) = self.ensure(offset, value.len() as u64) {
            self.data[offset as usize..end].copy_from_slice(value);
        }
    }

    /// Grow to cover `offset..offset + length` without writing anything.
    /// Copies call this before building their source buffer so its size is
    /// bounded by the memory maximum. Returns false once an error is
    /// recorded.
    pub fn reserve(&mut self, offset: U256, length: u64) -> bool {
        let offset = match to_u64(offset) {
            Some(offset) => offset,
            None => {
                self.out_of_bounds(format!("reserve offset {} does not fit in 64 bits", offset));
                return false;
            }
        };
        length == 0 || self.ensure(offset, length).is_some()
    }

    /// Bytes currently allocated; the first offset guaranteed unused by
    /// anything below it.
    pub fn capacity(&self) -> U256 {
        U256::from(self.data.len() as u64)
    }

    /// Grow to cover `offset..offset + length`, returning the end index.
    fn ensure(&mut self, offset: u64, length: u64) -> Option<usize> {
        let end = match offset.checked_add(length) {
            Some(end) if end <= ABSOLUTE_MAX_CAPACITY => end,
            _ => {
                self.out_of_bounds(format!(
                    "cannot address memory beyond {} bytes",
                    ABSOLUTE_MAX_CAPACITY
                ));
                return None;
            }
        };
        let current = self.data.len() as u64;
        if end <= current {
            return Some(end as usize);
        }
        if end > self.maximum_capacity {
            self.out_of_bounds(format!(
                "growing to {} bytes exceeds the maximum of {} bytes",
                end, self.maximum_capacity
            ));
            return None;
        }
        let new_capacity = (words(end) * WORD_SIZE).min(self.maximum_capacity);
        let cost = (words(new_capacity) - words(current)).saturating_mul(self.word_cost);
        if let Err(err) = self.gas.consume(cost) {
            self.sink.push_error(err);
            return None;
        }
        self.data.resize(new_capacity as usize, 0);
        Some(end as usize)
    }

    fn out_of_bounds(&self, reason: String) {
        self.sink.push_error(EvmError::MemoryOutOfBounds(reason));
    }
}

fn to_u64(value: U256) -> Option<u64> {
    if value.bits() > 64 {
        None
    } else {
        Some(value.low_u64())
    }
}
