//! Call parameters and the collaborators a call runs against

use crate::error::{EvmError, EvmResult};
use crate::events::EventSink;
use crate::frame::CallFrame;
use primitive_types::U256;
use std::collections::BTreeMap;
use std::fmt;
use xledger_crypto::keccak256;
use xledger_primitives::{Address, BlockHeight, Gas};

/// How a call was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallType {
    /// Plain call; code and storage of the target, value transferred
    #[default]
    Call,
    /// Code of the target run against the caller's own storage
    CallCode,
    /// Like CALLCODE but keeps the original caller and value
    DelegateCall,
    /// Read-only call
    StaticCall,
    /// Contract initialisation
    Create,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallType::Call => "call",
            CallType::CallCode => "callcode",
            CallType::DelegateCall => "delegatecall",
            CallType::StaticCall => "staticcall",
            CallType::Create => "create",
        };
        write!(f, "{}", name)
    }
}

/// Parameters of one call. Only `gas` changes during the call: the callee
/// draws it down and the caller gets back whatever is left.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallParams {
    /// Account that signed the transaction
    pub origin: Address,
    /// Immediate caller
    pub caller: Address,
    /// Account whose storage the code runs against
    pub callee: Address,
    /// Call data
    pub input: Vec<u8>,
    /// Value sent with the call
    pub value: U256,
    /// Gas budget
    pub gas: Gas,
    /// Call type
    pub call_type: CallType,
}

impl CallParams {
    /// Create a plain call
    pub fn new(caller: Address, callee: Address, input: Vec<u8>, gas: Gas) -> Self {
        Self {
            origin: caller,
            caller,
            callee,
            input,
            value: U256::zero(),
            gas,
            call_type: CallType::Call,
        }
    }

    /// Set the value sent with the call
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the transaction origin
    pub fn with_origin(mut self, origin: Address) -> Self {
        self.origin = origin;
        self
    }
}

/// Chain information visible to contracts
pub trait Blockchain {
    /// Height of the last committed block
    fn last_block_height(&self) -> BlockHeight;

    /// Time of the last committed block, in unix seconds
    fn last_block_time(&self) -> u64;

    /// Hash of the block at `height`
    fn block_hash(&self, height: BlockHeight) -> EvmResult<Vec<u8>>;
}

/// Fixed chain view. Block hashes default to keccak256 of the big-endian
/// height unless set explicitly.
#[derive(Clone, Debug, Default)]
pub struct TestBlockchain {
    height: BlockHeight,
    time: u64,
    hashes: BTreeMap<BlockHeight, Vec<u8>>,
}

impl TestBlockchain {
    /// Chain whose last block is `height` at `time`
    pub fn new(height: BlockHeight, time: u64) -> Self {
        Self {
            height,
            time,
            hashes: BTreeMap::new(),
        }
    }

    /// Override the hash of one block
    pub fn with_block_hash(mut self, height: BlockHeight, hash: Vec<u8>) -> Self {
        self.hashes.insert(height, hash);
        self
    }
}

impl Blockchain for TestBlockchain {
    fn last_block_height(&self) -> BlockHeight {
        self.height
    }

    fn last_block_time(&self) -> u64 {
        self.time
    }

    fn block_hash(&self, height: BlockHeight) -> EvmResult<Vec<u8>> {
        if height > self.height {
            return Err(EvmError::InvalidBlockNumber(height));
        }
        Ok(match self.hashes.get(&height) {
            Some(hash) => hash.clone(),
            None => keccak256(&height.to_be_bytes()).as_bytes().to_vec(),
        })
    }
}

/// Everything one call runs against
pub struct Context<'a, 'f> {
    /// State view of the call
    pub frame: &'a mut CallFrame<'f>,
    /// Chain information
    pub blockchain: &'a dyn Blockchain,
    /// Destination of logs and call events
    pub events: &'a mut dyn EventSink,
}

impl<'a, 'f> Context<'a, 'f> {
    /// Bundle the collaborators of a call
    pub fn new(
        frame: &'a mut CallFrame<'f>,
        blockchain: &'a dyn Blockchain,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            frame,
            blockchain,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_params_builder() {
        let caller = Address::from_bytes([1; 20]);
        let callee = Address::from_bytes([2; 20]);
        let params = CallParams::new(caller, callee, vec![0xAA], 1000)
            .with_value(U256::from(5))
            .with_origin(Address::from_bytes([9; 20]));

        assert_eq!(params.caller, caller);
        assert_eq!(params.callee, callee);
        assert_eq!(params.origin, Address::from_bytes([9; 20]));
        assert_eq!(params.value, U256::from(5));
        assert_eq!(params.call_type, CallType::Call);
    }

    #[test]
    fn test_test_blockchain_hashes() {
        let chain = TestBlockchain::new(10, 1_600_000_000).with_block_hash(3, vec![0xAB; 32]);
        assert_eq!(chain.last_block_height(), 10);
        assert_eq!(chain.last_block_time(), 1_600_000_000);
        assert_eq!(chain.block_hash(3).unwrap(), vec![0xAB; 32]);
        assert_eq!(chain.block_hash(4).unwrap().len(), 32);
        assert_ne!(chain.block_hash(4).unwrap(), chain.block_hash(5).unwrap());
        assert_eq!(chain.block_hash(11), Err(EvmError::InvalidBlockNumber(11)));
    }

    #[test]
    fn test_call_type_display() {
        assert_eq!(CallType::DelegateCall.to_string(), "delegatecall");
        assert_eq!(CallType::StaticCall.to_string(), "staticcall");
    }
}
