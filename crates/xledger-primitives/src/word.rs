//! 256-bit word (32 bytes)

use crate::U256;
use std::fmt;
use thiserror::Error;

/// Word parsing error
#[derive(Debug, Error)]
pub enum WordError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid word length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },
}

/// 32-byte big-endian word; the operand type of the stack and of storage
/// keys and values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Word([u8; 32]);

/// Alias used where the word is a hash digest
pub type H256 = Word;

impl Word {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// Zero word
    pub const ZERO: Word = Word([0u8; 32]);

    /// The word holding one
    pub const ONE: Word = {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        Word(bytes)
    };

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Word(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, WordError> {
        if slice.len() != Self::LEN {
            return Err(WordError::InvalidLength {
                expected: Self::LEN,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Word(bytes))
    }

    /// Right-align up to 32 bytes into a word. Longer input keeps its last
    /// 32 bytes.
    pub fn left_pad(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        if slice.len() >= Self::LEN {
            bytes.copy_from_slice(&slice[slice.len() - Self::LEN..]);
        } else {
            bytes[Self::LEN - slice.len()..].copy_from_slice(slice);
        }
        Word(bytes)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, WordError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| WordError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encode an unsigned 64-bit integer
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Word(bytes)
    }

    /// Encode a 256-bit integer
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Word(bytes)
    }

    /// Decode as a 256-bit integer
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Decode as u64 if the 24 high bytes are zero
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[..24].iter().any(|&b| b != 0) {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[24..]);
        Some(u64::from_be_bytes(bytes))
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({})", self.to_hex())
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Word {
    fn from(bytes: [u8; 32]) -> Self {
        Word(bytes)
    }
}

impl From<U256> for Word {
    fn from(value: U256) -> Self {
        Word::from_u256(value)
    }
}

impl AsRef<[u8]> for Word {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
