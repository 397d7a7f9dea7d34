//! # xledger-evm
//!
//! EVM execution engine for XLedger.
//!
//! This crate provides:
//! - A gas-metered bytecode interpreter with nested CALL/CREATE support
//! - Layered call frames that commit state only on success
//! - Native contract dispatch (sha256, ripemd160, identity and expmod precompiles built in)
//! - Capability checks for calls and account creation
//! - Log and call event buffering
//!
//! State, chain information and event delivery are supplied by the caller
//! through the [`StateReaderWriter`], [`Blockchain`] and [`EventSink`]
//! traits. [`MemoryState`], [`TestBlockchain`] and [`Events`] are simple
//! in-memory implementations.
//!
//! ```
//! use xledger_evm::{CallParams, Evm, Events, MemoryState, TestBlockchain};
//! use xledger_primitives::Address;
//!
//! // PUSH1 1, PUSH1 2, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
//! let code = [0x60, 0x01, 0x60, 0x02, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3];
//! let mut state = MemoryState::new();
//! let mut events = Events::new();
//! let mut params = CallParams::new(Address::ZERO, Address::from_bytes([1; 20]), Vec::new(), 1_000);
//!
//! let output = Evm::default()
//!     .execute(&mut state, &TestBlockchain::default(), &mut events, &mut params, &code)
//!     .unwrap();
//! assert_eq!(output[31], 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod code;
mod config;
mod context;
mod error;
mod events;
mod evm;
mod frame;
mod gas;
mod interpreter;
mod math;
mod memory;
mod native;
mod opcode;
mod permission;
mod sink;
mod stack;
mod state;

pub use code::Code;
pub use config::{EvmOptions, DATA_STACK_INITIAL_CAPACITY, DATA_STACK_MAX_DEPTH, MEMORY_MAXIMUM_CAPACITY};
pub use context::{Blockchain, CallParams, CallType, Context, TestBlockchain};
pub use error::{EvmError, EvmResult};
pub use events::{CallEvent, Event, EventSink, Events, LogEvent, LogFreeEventSink};
pub use evm::{CreateSequence, Evm};
pub use frame::CallFrame;
pub use gas::{cost, GasMeter, GasSchedule};
pub use interpreter::MAXIMUM_ALLOWED_BLOCK_LOOKBACK;
pub use math::I256;
pub use memory::{Memory, ABSOLUTE_MAX_CAPACITY};
pub use native::{precompile_address, Dispatcher, ExpMod, Native, Natives, NoNatives, Precompile};
pub use opcode::Opcode;
pub use permission::{ensure_permission, AllowAll, Capability, CapabilityTable, Permissions};
pub use sink::ErrorSink;
pub use stack::Stack;
pub use state::{Account, MemoryState, StateReader, StateReaderWriter, StateWriter};
