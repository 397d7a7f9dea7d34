//! First-error-wins accumulator shared by the stack, memory and interpreter

use crate::error::{EvmError, EvmResult};
use std::cell::RefCell;

/// Holds at most one error for the lifetime of one contract invocation.
///
/// Sub-operations record failures here instead of unwinding; the interpreter
/// polls it once per instruction and halts as soon as it is set. Once an
/// error is held, later errors are dropped.
#[derive(Debug, Default)]
pub struct ErrorSink {
    error: RefCell<Option<EvmError>>,
}

impl ErrorSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless one is already held. Returns true, so call
    /// sites can write `if sink.push_error(..) { return .. }`.
    pub fn push_error(&self, error: EvmError) -> bool {
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
        true
    }

    /// Unwrap an ok value or record the error and yield nothing
    pub fn push_result<T>(&self, result: EvmResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push_error(err);
                None
            }
        }
    }

    /// Whether an error is held
    pub fn is_err(&self) -> bool {
        self.error.borrow().is_some()
    }

    /// Clone of the held error
    pub fn error(&self) -> Option<EvmError> {
        self.error.borrow().clone()
    }

    /// Remove and return the held error
    pub fn take(&self) -> Option<EvmError> {
        self.error.borrow_mut().take()
    }
}
