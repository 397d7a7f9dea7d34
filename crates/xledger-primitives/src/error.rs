//! Common error types for primitives

use crate::address::AddressError;
use crate::word::WordError;
use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// Address error
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Word error
    #[error("word error: {0}")]
    Word(#[from] WordError),
}
