//! # xledger-primitives
//!
//! Primitive types for the XLedger execution engine.
//!
//! This crate provides the fixed-width values every other crate speaks in:
//! 20-byte addresses, 32-byte words and the 256-bit integer used for
//! arithmetic on them.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod word;

pub use address::{Address, AddressError};
pub use error::PrimitiveError;
pub use word::{Word, WordError, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Block height type
pub type BlockHeight = u64;

/// Gas type
pub type Gas = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_word_roundtrip() {
        let value = U256::from(0x1234_5678u64);
        let word = Word::from_u256(value);
        assert_eq!(word.to_u256(), value);
        assert_eq!(word.as_bytes()[28..], [0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_address_word_roundtrip() {
        let addr = Address::from_bytes([0xAB; 20]);
        let word = addr.to_word();
        assert_eq!(word.as_bytes()[..12], [0u8; 12]);
        assert_eq!(Address::from_word(&word), addr);
    }
}
