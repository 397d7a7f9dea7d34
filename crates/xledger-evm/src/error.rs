//! EVM error types

use crate::permission::Capability;
use thiserror::Error;
use xledger_primitives::Address;

/// Selector of the Solidity `Error(string)` revert payload
const REVERT_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// EVM execution errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Gas budget exhausted
    #[error("insufficient gas")]
    InsufficientGas,

    /// Push beyond the configured data stack depth
    #[error("data stack overflow")]
    DataStackOverflow,

    /// Pop, dup or swap on too few stack items
    #[error("data stack underflow")]
    DataStackUnderflow,

    /// Linear memory access outside the addressable range
    #[error("memory out of bounds: {0}")]
    MemoryOutOfBounds(String),

    /// Jump to a location that is not a JUMPDEST opcode
    #[error("invalid jump destination: {0}")]
    InvalidJumpDest(u64),

    /// Call target does not exist
    #[error("unknown address: {0}")]
    UnknownAddress(Address),

    /// Account required by the operation does not exist
    #[error("account {0} does not exist")]
    NonExistentAccount(Address),

    /// Account creation at an address already in use
    #[error("account already exists at {0}")]
    DuplicateAddress(Address),

    /// Caller lacks a capability
    #[error("account {address} does not have capability {capability}")]
    PermissionDenied {
        /// Account that was checked
        address: Address,
        /// Missing capability
        capability: Capability,
    },

    /// REVERT opcode; carries the output so the caller can inspect it
    #[error("execution reverted")]
    ExecutionReverted(Vec<u8>),

    /// INVALID opcode
    #[error("execution aborted")]
    ExecutionAborted,

    /// State mutation or log in a read-only context
    #[error("illegal write in read-only context")]
    IllegalWrite,

    /// Word used as a 64-bit integer has non-zero high bytes
    #[error("integer overflow")]
    IntegerOverflow,

    /// Slice of call data or code starting past its end
    #[error("input out of bounds")]
    InputOutOfBounds,

    /// RETURNDATACOPY past the end of the return data buffer
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Nested calls deeper than the configured maximum
    #[error("call stack overflow")]
    CallStackOverflow,

    /// BLOCKHASH for the current or a future block
    #[error("invalid block number: {0}")]
    InvalidBlockNumber(u64),

    /// BLOCKHASH further back than the look-back window
    #[error("block number {0} out of range")]
    BlockNumberOutOfRange(u64),

    /// Value transfer exceeds the sender's balance
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Byte that is not an opcode this engine executes
    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Failure reported by a native contract
    #[error("native contract error: {0}")]
    Native(String),

    /// Failure reported by the state collaborator
    #[error("state error: {0}")]
    State(String),
}

/// Result type for EVM operations
pub type EvmResult<T> = Result<T, EvmError>;

impl EvmError {
    /// Output carried by the error; only a revert has any.
    pub fn output(&self) -> &[u8] {
        match self {
            EvmError::ExecutionReverted(output) => output,
            _ => &[],
        }
    }

    /// Whether this is a REVERT rather than a hard failure
    pub fn is_revert(&self) -> bool {
        matches!(self, EvmError::ExecutionReverted(_))
    }

    /// Decode a Solidity `Error(string)` revert payload, if that is what the
    /// revert output holds.
    pub fn revert_reason(&self) -> Option<String> {
        let output = match self {
            EvmError::ExecutionReverted(output) => output,
            _ => return None,
        };
        let data = output.strip_prefix(&REVERT_SELECTOR[..])?;
        let offset = read_usize(data, 0)?;
        let len = read_usize(data, offset)?;
        let start = offset.checked_add(32)?;
        let bytes = data.get(start..start.checked_add(len)?)?;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

/// Read an ABI-encoded uint at `at` as a usize
fn read_usize(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(32)?)?;
    if word[..24].iter().any(|&b| b != 0) {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(bytes)).ok()
}
