//! Logs and call events emitted during execution

use crate::context::{CallParams, CallType};
use crate::error::{EvmError, EvmResult};
use primitive_types::U256;
use xledger_primitives::{Address, Gas, Word};

/// Event emitted by LOG0..LOG4
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics (0 to 4)
    pub topics: Vec<Word>,
    /// Unindexed data
    pub data: Vec<u8>,
}

/// Record of one completed call, successful or not
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEvent {
    /// Call type
    pub call_type: CallType,
    /// Transaction origin
    pub origin: Address,
    /// Immediate caller
    pub caller: Address,
    /// Storage context of the call
    pub callee: Address,
    /// Call data
    pub input: Vec<u8>,
    /// Value sent
    pub value: U256,
    /// Gas made available to the call
    pub gas: Gas,
    /// Output (revert output on failure)
    pub output: Vec<u8>,
    /// Call stack depth the call ran at
    pub depth: u64,
    /// Failure, if any
    pub error: Option<EvmError>,
}

impl CallEvent {
    /// Describe a finished call made with `params` and `gas` available
    pub fn new(params: &CallParams, gas: Gas, depth: u64, result: &EvmResult<Vec<u8>>) -> Self {
        let (output, error) = match result {
            Ok(output) => (output.clone(), None),
            Err(err) => (err.output().to_vec(), Some(err.clone())),
        };
        Self {
            call_type: params.call_type,
            origin: params.origin,
            caller: params.caller,
            callee: params.callee,
            input: params.input.clone(),
            value: params.value,
            gas,
            output,
            depth,
            error,
        }
    }
}

/// Event collaborator
pub trait EventSink {
    /// Record a log
    fn log(&mut self, event: LogEvent) -> EvmResult<()>;

    /// Record a finished call
    fn call(&mut self, event: CallEvent) -> EvmResult<()>;
}

/// Forwards call events and rejects logs; used under STATICCALL.
pub struct LogFreeEventSink<'a> {
    inner: &'a mut dyn EventSink,
}

impl<'a> LogFreeEventSink<'a> {
    /// Wrap `inner`
    pub fn new(inner: &'a mut dyn EventSink) -> Self {
        Self { inner }
    }
}

impl EventSink for LogFreeEventSink<'_> {
    fn log(&mut self, _event: LogEvent) -> EvmResult<()> {
        Err(EvmError::IllegalWrite)
    }

    fn call(&mut self, event: CallEvent) -> EvmResult<()> {
        self.inner.call(event)
    }
}

/// One recorded event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A log
    Log(LogEvent),
    /// A call
    Call(CallEvent),
}

/// Collects events in emission order.
///
/// Also serves as the per-call buffer: a nested call writes into a fresh
/// `Events` that is flushed into the caller's sink only if the call
/// succeeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Events {
    events: Vec<Event>,
}

impl Events {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Logs in order
    pub fn logs(&self) -> impl Iterator<Item = &LogEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::Log(log) => Some(log),
            Event::Call(_) => None,
        })
    }

    /// Call events in order
    pub fn calls(&self) -> impl Iterator<Item = &CallEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::Call(call) => Some(call),
            Event::Log(_) => None,
        })
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Replay everything into `sink`, in order
    pub fn flush_into(self, sink: &mut dyn EventSink) -> EvmResult<()> {
        for event in self.events {
            match event {
                Event::Log(log) => sink.log(log)?,
                Event::Call(call) => sink.call(call)?,
            }
        }
        Ok(())
    }
}

impl EventSink for Events {
    fn log(&mut self, event: LogEvent) -> EvmResult<()> {
        self.events.push(Event::Log(event));
        Ok(())
    }

    fn call(&mut self, event: CallEvent) -> EvmResult<()> {
        self.events.push(Event::Call(event));
        Ok(())
    }
}
