//! Execution entry point

use crate::code::Code;
use crate::config::{EvmOptions, NONCE_LENGTH};
use crate::context::{Blockchain, CallParams, CallType, Context};
use crate::error::{EvmError, EvmResult};
use crate::events::{CallEvent, EventSink, Events, LogFreeEventSink};
use crate::frame::CallFrame;
use crate::interpreter::Interpreter;
use crate::native::{Dispatcher, Native, Natives};
use crate::permission::{AllowAll, Permissions};
use crate::state::{Account, StateReader, StateReaderWriter, StateWriter};
use primitive_types::U256;
use xledger_crypto::new_contract_address;
use xledger_primitives::Address;

/// Counter that makes CREATE addresses unique within one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSequence {
    nonce: Vec<u8>,
    sequence: u64,
}

impl CreateSequence {
    /// Start counting from zero under `nonce`
    pub fn new(nonce: Vec<u8>) -> Self {
        Self { nonce, sequence: 0 }
    }

    /// Number of addresses handed out so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Derive the next CREATE address for `creator`.
    ///
    /// The hashed nonce is the configured nonce padded or truncated to 32
    /// bytes followed by the big-endian sequence number.
    pub fn next_address(&mut self, creator: &Address) -> Address {
        self.sequence += 1;
        let mut nonce = [0u8; NONCE_LENGTH + 8];
        let len = self.nonce.len().min(NONCE_LENGTH);
        nonce[..len].copy_from_slice(&self.nonce[..len]);
        nonce[NONCE_LENGTH..].copy_from_slice(&self.sequence.to_be_bytes());
        new_contract_address(creator, &nonce)
    }
}

/// What a call runs: a native contract or bytecode
pub(crate) enum Callable<'n> {
    Native(&'n dyn Native),
    Code(Code),
}

/// Immutable part of the engine shared by every frame of a transaction
pub(crate) struct Engine {
    pub(crate) options: EvmOptions,
    pub(crate) dispatcher: Box<dyn Dispatcher>,
    pub(crate) permissions: Box<dyn Permissions>,
}

impl Engine {
    /// Execution options
    pub fn options(&self) -> &EvmOptions {
        &self.options
    }

    /// Capability oracle
    pub fn permissions(&self) -> &dyn Permissions {
        &*self.permissions
    }

    /// What to run for a call into `account`
    pub(crate) fn callable<'n>(&'n self, account: &Account) -> Callable<'n> {
        match self.dispatcher.dispatch(account) {
            Some(native) => Callable::Native(native),
            None => Callable::Code(Code::new(account.code.clone())),
        }
    }

    /// Run one call inside `frame`, the frame already opened for it.
    ///
    /// Value moves first for CALL, CALLCODE and CREATE. Logs land in
    /// `events`, which rejects them when the frame is read-only. Neither the
    /// frame nor `events` is flushed here.
    pub(crate) fn call(
        &self,
        sequence: &mut CreateSequence,
        frame: &mut CallFrame<'_>,
        blockchain: &dyn Blockchain,
        events: &mut Events,
        params: &mut CallParams,
        callable: Callable<'_>,
    ) -> EvmResult<Vec<u8>> {
        let mut log_free;
        let sink: &mut dyn EventSink = if frame.is_read_only() {
            log_free = LogFreeEventSink::new(events);
            &mut log_free
        } else {
            events
        };
        let mut ctx = Context::new(frame, blockchain, sink);

        if matches!(
            params.call_type,
            CallType::Call | CallType::CallCode | CallType::Create
        ) {
            transfer(ctx.frame, &params.caller, &params.callee, params.value)?;
        }

        match callable {
            Callable::Native(native) => {
                tracing::debug!("Native call {} at {}", native.name(), params.callee);
                native.call(&mut ctx, params)
            }
            Callable::Code(code) => Interpreter::new(self, code).execute(sequence, &mut ctx, params),
        }
    }
}

/// The EVM.
///
/// Holds the options, native dispatcher and permission oracle, plus the
/// CREATE sequence which advances across calls to [`Evm::execute`] until
/// [`Evm::set_nonce`] resets it.
pub struct Evm {
    engine: Engine,
    sequence: CreateSequence,
}

impl Default for Evm {
    fn default() -> Self {
        Self::new(EvmOptions::default())
    }
}

impl Evm {
    /// EVM with the built-in precompiles and no permission checks
    pub fn new(options: EvmOptions) -> Self {
        let sequence = CreateSequence::new(options.nonce.clone());
        Self {
            engine: Engine {
                options,
                dispatcher: Box::new(Natives::precompiles()),
                permissions: Box::new(AllowAll),
            },
            sequence,
        }
    }

    /// Replace the native dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Box<dyn Dispatcher>) -> Self {
        self.engine.dispatcher = dispatcher;
        self
    }

    /// Replace the permission oracle
    pub fn with_permissions(mut self, permissions: Box<dyn Permissions>) -> Self {
        self.engine.permissions = permissions;
        self
    }

    /// Execution options
    pub fn options(&self) -> &EvmOptions {
        self.engine.options()
    }

    /// Change the CREATE nonce and restart the sequence
    pub fn set_nonce(&mut self, nonce: Vec<u8>) {
        self.engine.options.nonce = nonce.clone();
        self.sequence = CreateSequence::new(nonce);
    }

    /// CREATE addresses handed out since the last nonce change
    pub fn create_sequence(&self) -> u64 {
        self.sequence.sequence()
    }

    /// Run `code` as `params.callee`.
    ///
    /// All state changes go through a frame over `state` that is synced only
    /// on success, so a failed execution leaves `state` untouched. The same
    /// holds for logs, which reach `events` only on success; a call event
    /// describing the execution is emitted either way. `params.gas` is left
    /// holding the unused gas. A revert comes back as
    /// [`EvmError::ExecutionReverted`] carrying the output.
    pub fn execute(
        &mut self,
        state: &mut dyn StateReaderWriter,
        blockchain: &dyn Blockchain,
        events: &mut dyn EventSink,
        params: &mut CallParams,
        code: &[u8],
    ) -> EvmResult<Vec<u8>> {
        tracing::debug!(
            "Execute {} from {} to {} with {} gas",
            params.call_type,
            params.caller,
            params.callee,
            params.gas
        );
        let gas = params.gas;
        let mut frame = CallFrame::new(state, self.engine.options.call_stack_max_depth);
        let mut buffer = Events::new();

        let result = self.engine.call(
            &mut self.sequence,
            &mut frame,
            blockchain,
            &mut buffer,
            params,
            Callable::Code(Code::new(code.to_vec())),
        );
        let result = result.and_then(|output| {
            frame.sync()?;
            buffer.flush_into(events)?;
            Ok(output)
        });

        if let Err(err) = &result {
            tracing::debug!("Execution failed: {}", err);
        }
        let emitted = events.call(CallEvent::new(params, gas, 0, &result));
        result.and_then(|output| emitted.map(|_| output))
    }
}

/// Move `amount` from `from` to `to`. Zero is a no-op; both accounts must
/// exist otherwise.
pub(crate) fn transfer(
    frame: &mut CallFrame<'_>,
    from: &Address,
    to: &Address,
    amount: U256,
) -> EvmResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let mut sender = must_get_account(frame, from)?;
    sender.subtract_from_balance(amount)?;
    frame.update_account(sender)?;

    let mut receiver = must_get_account(frame, to)?;
    receiver.add_to_balance(amount)?;
    frame.update_account(receiver)
}

/// Account at `address`, failing with `NonExistentAccount` if missing
pub(crate) fn must_get_account(
    state: &dyn StateReader,
    address: &Address,
) -> EvmResult<Account> {
    state
        .get_account(address)?
        .ok_or(EvmError::NonExistentAccount(*address))
}

/// Create an empty account at `address`, which must be unused
pub(crate) fn new_account(frame: &mut CallFrame<'_>, address: &Address) -> EvmResult<()> {
    if frame.account_exists(address)? {
        return Err(EvmError::DuplicateAddress(*address));
    }
    frame.update_account(Account::new(*address))
}
