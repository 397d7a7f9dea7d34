//! EVM bytecode interpreter

use crate::code::Code;
use crate::context::{CallParams, CallType, Context};
use crate::error::{EvmError, EvmResult};
use crate::events::{CallEvent, Events, LogEvent};
use crate::evm::{must_get_account, new_account, Callable, CreateSequence, Engine};
use crate::frame::CallFrame;
use crate::gas::GasMeter;
use crate::math;
use crate::memory::{Memory, ABSOLUTE_MAX_CAPACITY};
use crate::opcode::Opcode;
use crate::permission::{ensure_permission, Capability};
use crate::sink::ErrorSink;
use crate::stack::Stack;
use crate::state::{Account, StateReader, StateWriter};
use primitive_types::U256;
use xledger_crypto::{keccak256, new_contract_address2};
use xledger_primitives::{Address, Gas, Word};

/// How many blocks back BLOCKHASH can see
pub const MAXIMUM_ALLOWED_BLOCK_LOOKBACK: u64 = 256;

/// What the loop does after an instruction
enum Step {
    /// Advance past the instruction
    Next,
    /// The instruction moved the program counter itself
    Jumped,
    /// Stop with this output (unless an error is pending)
    Halt(Vec<u8>),
}

/// Mutable machine state of one invocation
struct Machine<'a> {
    pc: u64,
    stack: Stack<'a>,
    memory: Memory<'a>,
    return_data: Vec<u8>,
    gas: &'a GasMeter,
    sink: &'a ErrorSink,
}

impl Machine<'_> {
    fn use_gas(&self, amount: Gas) {
        self.sink.push_result(self.gas.consume(amount));
    }

    fn fail(&self, error: EvmError) {
        self.sink.push_error(error);
    }
}

/// Runs one piece of bytecode
pub(crate) struct Interpreter<'e> {
    engine: &'e Engine,
    code: Code,
}

impl<'e> Interpreter<'e> {
    /// Interpreter for `code` under `engine`'s options
    pub fn new(engine: &'e Engine, code: Code) -> Self {
        Self { engine, code }
    }

    /// Execute against `ctx`. Whatever the outcome, `params.gas` is left
    /// holding the gas that was not used.
    pub fn execute(
        &self,
        sequence: &mut CreateSequence,
        ctx: &mut Context<'_, '_>,
        params: &mut CallParams,
    ) -> EvmResult<Vec<u8>> {
        if self.code.is_empty() {
            return Ok(Vec::new());
        }

        let options = &self.engine.options;
        let sink = ErrorSink::new();
        let gas = GasMeter::new(params.gas);
        let mut machine = Machine {
            pc: 0,
            stack: Stack::new(
                &sink,
                &gas,
                options.gas.stack_op,
                options.data_stack_initial_capacity,
                options.data_stack_max_depth,
            ),
            memory: Memory::new(
                &sink,
                &gas,
                options.gas.memory_word,
                options.memory_initial_capacity,
                options.memory_maximum_capacity,
            ),
            return_data: Vec::new(),
            gas: &gas,
            sink: &sink,
        };

        let result = self.run(&mut machine, sequence, ctx, params);
        params.gas = gas.remaining();
        result
    }

    fn run(
        &self,
        m: &mut Machine<'_>,
        sequence: &mut CreateSequence,
        ctx: &mut Context<'_, '_>,
        params: &CallParams,
    ) -> EvmResult<Vec<u8>> {
        loop {
            if let Some(err) = m.sink.take() {
                return Err(err);
            }
            m.use_gas(self.engine.options.gas.base_op);
            if let Some(err) = m.sink.take() {
                return Err(err);
            }

            let byte = self.code.get_op(m.pc);
            let op = match Opcode::from_byte(byte) {
                Some(op) => op,
                None => return Err(EvmError::UnknownOpcode(byte)),
            };
            tracing::trace!(
                "(pc) {:<5} (op) {:<14} (st) {:<4} (gas) {}",
                m.pc,
                op,
                m.stack.len(),
                m.gas.remaining()
            );

            match self.step(op, m, sequence, ctx, params) {
                Step::Next => m.pc += 1,
                Step::Jumped => {}
                Step::Halt(output) => {
                    return match m.sink.take() {
                        Some(err) => Err(err),
                        None => Ok(output),
                    };
                }
            }
        }
    }

    fn step(
        &self,
        op: Opcode,
        m: &mut Machine<'_>,
        sequence: &mut CreateSequence,
        ctx: &mut Context<'_, '_>,
        params: &CallParams,
    ) -> Step {
        let schedule = &self.engine.options.gas;
        match op {
            Opcode::STOP => return Step::Halt(Vec::new()),

            // Arithmetic
            Opcode::ADD => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x.overflowing_add(y).0);
            }
            Opcode::MUL => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x.overflowing_mul(y).0);
            }
            Opcode::SUB => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x.overflowing_sub(y).0);
            }
            Opcode::DIV => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack
                    .push_u256(if y.is_zero() { U256::zero() } else { x / y });
            }
            Opcode::SDIV => {
                let (x, y) = (m.stack.pop_i256(), m.stack.pop_i256());
                m.stack.push_i256(x.div(y));
            }
            Opcode::MOD => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack
                    .push_u256(if y.is_zero() { U256::zero() } else { x % y });
            }
            Opcode::SMOD => {
                let (x, y) = (m.stack.pop_i256(), m.stack.pop_i256());
                m.stack.push_i256(x.rem(y));
            }
            Opcode::ADDMOD => {
                let (x, y, z) = (m.stack.pop_u256(), m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(math::add_mod(x, y, z));
            }
            Opcode::MULMOD => {
                let (x, y, z) = (m.stack.pop_u256(), m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(math::mul_mod(x, y, z));
            }
            Opcode::EXP => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x.overflowing_pow(y).0);
            }
            Opcode::SIGNEXTEND => {
                let back = m.stack.pop_u256();
                if back < U256::from(31) {
                    let bits = (back.low_u64() as usize + 1) * 8;
                    let value = m.stack.pop_u256();
                    m.stack.push_u256(math::sign_extend(value, bits));
                }
            }

            // Comparison and bitwise logic
            Opcode::LT => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_bool(x < y);
            }
            Opcode::GT => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_bool(x > y);
            }
            Opcode::SLT => {
                let (x, y) = (m.stack.pop_i256(), m.stack.pop_i256());
                m.stack.push_bool(x < y);
            }
            Opcode::SGT => {
                let (x, y) = (m.stack.pop_i256(), m.stack.pop_i256());
                m.stack.push_bool(x > y);
            }
            Opcode::EQ => {
                let (x, y) = (m.stack.pop(), m.stack.pop());
                m.stack.push_bool(x == y);
            }
            Opcode::ISZERO => {
                let x = m.stack.pop();
                m.stack.push_bool(x.is_zero());
            }
            Opcode::AND => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x & y);
            }
            Opcode::OR => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x | y);
            }
            Opcode::XOR => {
                let (x, y) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(x ^ y);
            }
            Opcode::NOT => {
                let x = m.stack.pop_u256();
                m.stack.push_u256(!x);
            }
            Opcode::BYTE => {
                let index = m.stack.pop64();
                let value = m.stack.pop();
                let byte = if index < 32 {
                    value.as_bytes()[index as usize]
                } else {
                    0
                };
                m.stack.push64(byte as u64);
            }
            Opcode::SHL => {
                let (shift, value) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(math::shl(shift, value));
            }
            Opcode::SHR => {
                let (shift, value) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(math::shr(shift, value));
            }
            Opcode::SAR => {
                let (shift, value) = (m.stack.pop_u256(), m.stack.pop_u256());
                m.stack.push_u256(math::sar(shift, value));
            }

            Opcode::SHA3 => {
                m.use_gas(schedule.sha3);
                let (offset, size) = (m.stack.pop_u256(), m.stack.pop_u256());
                let data = m.memory.read(offset, size);
                m.stack.push(keccak256(&data));
            }

            // Environment
            Opcode::ADDRESS => m.stack.push_address(params.callee),
            Opcode::BALANCE => {
                let address = m.stack.pop_address();
                m.use_gas(schedule.get_account);
                if let Some(account) = m.sink.push_result(must_get_account(&*ctx.frame, &address)) {
                    m.stack.push_u256(account.balance);
                }
            }
            Opcode::ORIGIN => m.stack.push_address(params.origin),
            Opcode::CALLER => m.stack.push_address(params.caller),
            Opcode::CALLVALUE => m.stack.push_u256(params.value),
            Opcode::CALLDATALOAD => {
                let offset = m.stack.pop64();
                if let Some(data) = m.sink.push_result(subslice(&params.input, offset, 32)) {
                    m.stack.push(Word::left_pad(&data));
                }
            }
            Opcode::CALLDATASIZE => m.stack.push64(params.input.len() as u64),
            Opcode::CALLDATACOPY => {
                let mem_offset = m.stack.pop_u256();
                let input_offset = m.stack.pop64();
                let length = m.stack.pop64();
                self.copy_to_memory(m, mem_offset, &params.input, input_offset, length);
            }
            Opcode::CODESIZE => m.stack.push64(self.code.len() as u64),
            Opcode::CODECOPY => {
                let mem_offset = m.stack.pop_u256();
                let code_offset = m.stack.pop64();
                let length = m.stack.pop64();
                self.copy_to_memory(m, mem_offset, self.code.bytes(), code_offset, length);
            }
            Opcode::GASPRICE => m.stack.push(Word::ZERO),
            Opcode::EXTCODESIZE => {
                let address = m.stack.pop_address();
                m.use_gas(schedule.get_account);
                match m.sink.push_result(ctx.frame.get_account(&address)) {
                    Some(Some(account)) => m.stack.push64(account.code.len() as u64),
                    Some(None) => m.stack.push(Word::ZERO),
                    None => {}
                }
            }
            Opcode::EXTCODECOPY => {
                let address = m.stack.pop_address();
                m.use_gas(schedule.get_account);
                match m.sink.push_result(ctx.frame.get_account(&address)) {
                    Some(Some(account)) => {
                        let mem_offset = m.stack.pop_u256();
                        let code_offset = m.stack.pop64();
                        let length = m.stack.pop64();
                        self.copy_to_memory(m, mem_offset, &account.code, code_offset, length);
                    }
                    Some(None) => m.fail(EvmError::UnknownAddress(address)),
                    None => {}
                }
            }
            Opcode::RETURNDATASIZE => m.stack.push64(m.return_data.len() as u64),
            Opcode::RETURNDATACOPY => {
                let mem_offset = m.stack.pop_u256();
                let output_offset = m.stack.pop_u256();
                let length = m.stack.pop_u256();
                let available = U256::from(m.return_data.len() as u64);
                match output_offset.checked_add(length) {
                    Some(end) if end <= available => {
                        let data = m.return_data[output_offset.as_usize()..end.as_usize()].to_vec();
                        m.use_gas(schedule.copy_gas(data.len() as u64));
                        m.memory.write(mem_offset, &data);
                    }
                    _ => m.fail(EvmError::ReturnDataOutOfBounds),
                }
            }
            Opcode::EXTCODEHASH => {
                let address = m.stack.pop_address();
                match m.sink.push_result(ctx.frame.get_account(&address)) {
                    Some(Some(account)) => m.stack.push(account.code_hash()),
                    Some(None) => m.stack.push(Word::ZERO),
                    None => {}
                }
            }

            // Block information
            Opcode::BLOCKHASH => {
                let number = m.stack.pop64();
                let last = ctx.blockchain.last_block_height();
                if number >= last {
                    m.fail(EvmError::InvalidBlockNumber(number));
                } else if last - number > MAXIMUM_ALLOWED_BLOCK_LOOKBACK {
                    m.fail(EvmError::BlockNumberOutOfRange(number));
                } else if let Some(hash) = m.sink.push_result(ctx.blockchain.block_hash(number)) {
                    m.stack.push(Word::left_pad(&hash));
                }
            }
            Opcode::COINBASE => m.stack.push(Word::ZERO),
            Opcode::TIMESTAMP => m.stack.push64(ctx.blockchain.last_block_time()),
            Opcode::BLOCKHEIGHT => m.stack.push64(ctx.blockchain.last_block_height()),
            Opcode::GASLIMIT => m.stack.push64(m.gas.remaining()),

            // Memory and storage
            Opcode::POP => {
                m.stack.pop();
            }
            Opcode::MLOAD => {
                let offset = m.stack.pop_u256();
                let data = m.memory.read(offset, U256::from(32));
                m.stack.push(Word::left_pad(&data));
            }
            Opcode::MSTORE => {
                let offset = m.stack.pop_u256();
                let value = m.stack.pop();
                m.memory.write(offset, value.as_bytes());
            }
            Opcode::MSTORE8 => {
                let offset = m.stack.pop_u256();
                let value = m.stack.pop_u256().low_u64() as u8;
                m.memory.write(offset, &[value]);
            }
            Opcode::SLOAD => {
                let key = m.stack.pop();
                if let Some(value) = m.sink.push_result(ctx.frame.get_storage(&params.callee, &key)) {
                    m.stack.push(value);
                }
            }
            Opcode::SSTORE => {
                let (key, value) = (m.stack.pop(), m.stack.pop());
                m.use_gas(schedule.storage_update);
                if !m.sink.is_err() {
                    m.sink
                        .push_result(ctx.frame.set_storage(params.callee, key, value));
                }
            }

            // Control flow
            Opcode::JUMP => {
                let to = m.stack.pop64();
                return self.jump(m, to);
            }
            Opcode::JUMPI => {
                let to = m.stack.pop64();
                let condition = m.stack.pop();
                if !condition.is_zero() {
                    return self.jump(m, to);
                }
            }
            Opcode::PC => m.stack.push64(m.pc),
            Opcode::MSIZE => {
                let capacity = m.memory.capacity();
                m.stack.push_u256(capacity);
            }
            Opcode::GAS => m.stack.push64(m.gas.remaining()),
            Opcode::JUMPDEST => {}

            Opcode::LOG0 | Opcode::LOG1 | Opcode::LOG2 | Opcode::LOG3 | Opcode::LOG4 => {
                self.log(m, ctx, params, op.log_topics());
            }

            Opcode::CREATE | Opcode::CREATE2 => self.create(op, m, sequence, ctx, params),
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => {
                self.call(op, m, sequence, ctx, params)
            }

            Opcode::RETURN => {
                let (offset, size) = (m.stack.pop_u256(), m.stack.pop_u256());
                return Step::Halt(m.memory.read(offset, size));
            }
            Opcode::REVERT => {
                let (offset, size) = (m.stack.pop_u256(), m.stack.pop_u256());
                let output = m.memory.read(offset, size);
                m.fail(EvmError::ExecutionReverted(output));
                return Step::Halt(Vec::new());
            }
            Opcode::INVALID => {
                m.fail(EvmError::ExecutionAborted);
                return Step::Halt(Vec::new());
            }
            Opcode::SELFDESTRUCT => {
                self.self_destruct(m, ctx, params);
                return Step::Halt(Vec::new());
            }

            _ if op.is_push() => {
                let size = op.push_size() as u64;
                if let Some(data) = m.sink.push_result(subslice(self.code.bytes(), m.pc + 1, size)) {
                    m.stack.push(Word::left_pad(&data));
                }
                m.pc += size;
            }
            _ if op.dup_depth() > 0 => m.stack.dup(op.dup_depth()),
            _ if op.swap_depth() > 0 => m.stack.swap(op.swap_depth()),
            _ => m.fail(EvmError::UnknownOpcode(op as u8)),
        }
        Step::Next
    }

    fn jump(&self, m: &mut Machine<'_>, to: u64) -> Step {
        if self.code.is_jump_dest(to) {
            m.pc = to;
        } else {
            m.fail(EvmError::InvalidJumpDest(to));
        }
        Step::Jumped
    }

    fn copy_to_memory(
        &self,
        m: &mut Machine<'_>,
        mem_offset: U256,
        source: &[u8],
        offset: u64,
        length: u64,
    ) {
        m.use_gas(self.engine.options.gas.copy_gas(length));
        if m.sink.is_err() || !m.memory.reserve(mem_offset, length) {
            return;
        }
        if let Some(data) = m.sink.push_result(subslice(source, offset, length)) {
            m.memory.write(mem_offset, &data);
        }
    }

    fn log(
        &self,
        m: &mut Machine<'_>,
        ctx: &mut Context<'_, '_>,
        params: &CallParams,
        topic_count: usize,
    ) {
        let (offset, size) = (m.stack.pop_u256(), m.stack.pop_u256());
        let topics: Vec<Word> = (0..topic_count).map(|_| m.stack.pop()).collect();
        let data = m.memory.read(offset, size);
        if m.sink.is_err() {
            return;
        }
        m.sink.push_result(ctx.events.log(LogEvent {
            address: params.callee,
            topics,
            data,
        }));
    }

    /// Create an account for `address` on behalf of `creator`
    fn create_account(
        &self,
        frame: &mut CallFrame<'_>,
        creator: &Address,
        address: &Address,
    ) -> EvmResult<()> {
        ensure_permission(self.engine.permissions(), creator, Capability::CreateAccount)?;
        new_account(frame, address)
    }

    fn create(
        &self,
        op: Opcode,
        m: &mut Machine<'_>,
        sequence: &mut CreateSequence,
        ctx: &mut Context<'_, '_>,
        params: &CallParams,
    ) {
        m.return_data.clear();
        let value = m.stack.pop_u256();
        let (offset, size) = (m.stack.pop_u256(), m.stack.pop_u256());
        let input = m.memory.read(offset, size);
        m.use_gas(self.engine.options.gas.create_account);
        let salt = (op == Opcode::CREATE2).then(|| m.stack.pop());
        if m.sink.is_err() {
            return;
        }

        let address = match salt {
            Some(salt) => new_contract_address2(&params.callee, &salt, &input),
            None => sequence.next_address(&params.callee),
        };
        let permitted = ensure_permission(
            self.engine.permissions(),
            &params.callee,
            Capability::CreateContract,
        );
        if m.sink.push_result(permitted).is_none() {
            return;
        }

        let mut child = match m.sink.push_result(ctx.frame.new_frame()) {
            Some(child) => child,
            None => return,
        };
        if m.sink.push_result(new_account(&mut child, &address)).is_none() {
            return;
        }

        let gas = m.gas.remaining();
        m.use_gas(gas);
        let mut child_params = CallParams {
            origin: params.origin,
            caller: params.callee,
            callee: address,
            input: input.clone(),
            value,
            gas,
            call_type: CallType::Create,
        };
        let depth = child.call_stack_depth();
        tracing::debug!("{} {} with {} gas at depth {}", op, address, gas, depth);

        let mut buffer = Events::new();
        let result = self.engine.call(
            sequence,
            &mut child,
            ctx.blockchain,
            &mut buffer,
            &mut child_params,
            Callable::Code(Code::new(input)),
        );
        if let Ok(code) = &result {
            let installed = install_code(&mut child, &address, code).and_then(|_| child.sync());
            if m.sink.push_result(installed).is_none() {
                return;
            }
            m.sink.push_result(buffer.flush_into(&mut *ctx.events));
        }
        m.sink
            .push_result(ctx.events.call(CallEvent::new(&child_params, gas, depth, &result)));
        m.gas.refund(child_params.gas);

        match result {
            Ok(_) => m.stack.push_address(address),
            Err(err) => {
                tracing::debug!("{} failed: {}", op, err);
                m.stack.push(Word::ZERO);
                m.return_data = err.output().to_vec();
            }
        }
    }

    fn call(
        &self,
        op: Opcode,
        m: &mut Machine<'_>,
        sequence: &mut CreateSequence,
        ctx: &mut Context<'_, '_>,
        params: &CallParams,
    ) {
        m.return_data.clear();
        let permitted = ensure_permission(self.engine.permissions(), &params.callee, Capability::Call);
        if m.sink.push_result(permitted).is_none() {
            return;
        }

        let gas_limit = m.stack.pop64();
        let target = m.stack.pop_address();
        let value = match op {
            Opcode::CALL | Opcode::CALLCODE => m.stack.pop_u256(),
            _ => params.value,
        };
        let (in_offset, in_size) = (m.stack.pop_u256(), m.stack.pop_u256());
        let ret_offset = m.stack.pop_u256();
        let ret_size = m.stack.pop64();

        m.use_gas(self.engine.options.gas.get_account);
        let account = match m.sink.push_result(ctx.frame.get_account(&target)) {
            Some(account) => account,
            None => return,
        };
        let account = match account {
            Some(account) => account,
            None if op != Opcode::CALL => {
                m.fail(EvmError::UnknownAddress(target));
                return;
            }
            None => {
                let created = self.create_account(ctx.frame, &params.callee, &target);
                if m.sink.push_result(created).is_none() {
                    return;
                }
                Account::new(target)
            }
        };
        let input = m.memory.read(in_offset, in_size);
        if m.sink.is_err() {
            return;
        }

        let mut child = match m.sink.push_result(ctx.frame.new_frame()) {
            Some(child) => child,
            None => return,
        };
        let gas = m.gas.call_gas(gas_limit);
        m.use_gas(gas);

        let (caller, callee, call_type) = match op {
            Opcode::CALL => (params.callee, target, CallType::Call),
            Opcode::CALLCODE => (params.callee, params.callee, CallType::CallCode),
            Opcode::DELEGATECALL => (params.caller, params.callee, CallType::DelegateCall),
            _ => {
                child.read_only();
                (params.callee, target, CallType::StaticCall)
            }
        };
        let mut child_params = CallParams {
            origin: params.origin,
            caller,
            callee,
            input,
            value,
            gas,
            call_type,
        };
        let depth = child.call_stack_depth();
        tracing::debug!("{} {} with {} gas at depth {}", call_type, target, gas, depth);

        let mut buffer = Events::new();
        let result = self.engine.call(
            sequence,
            &mut child,
            ctx.blockchain,
            &mut buffer,
            &mut child_params,
            self.engine.callable(&account),
        );
        if result.is_ok() {
            if m.sink.push_result(child.sync()).is_none() {
                return;
            }
            m.sink.push_result(buffer.flush_into(&mut *ctx.events));
        }
        m.sink
            .push_result(ctx.events.call(CallEvent::new(&child_params, gas, depth, &result)));
        m.gas.refund(child_params.gas);

        match result {
            Ok(output) => {
                m.stack.push(Word::ONE);
                self.write_output(m, ret_offset, &output, ret_size);
                m.return_data = output;
            }
            Err(err) => {
                tracing::debug!("{} to {} failed: {}", call_type, target, err);
                m.stack.push(Word::ZERO);
                if err.is_revert() {
                    self.write_output(m, ret_offset, err.output(), ret_size);
                }
                m.return_data = err.output().to_vec();
            }
        }
    }

    fn write_output(&self, m: &mut Machine<'_>, offset: U256, output: &[u8], size: u64) {
        if !m.memory.reserve(offset, size) {
            return;
        }
        if let Some(data) = m.sink.push_result(fit(output, size)) {
            m.memory.write(offset, &data);
        }
    }

    fn self_destruct(&self, m: &mut Machine<'_>, ctx: &mut Context<'_, '_>, params: &CallParams) {
        let receiver = m.stack.pop_address();
        let schedule = &self.engine.options.gas;
        m.use_gas(schedule.get_account);
        let exists = match m.sink.push_result(ctx.frame.account_exists(&receiver)) {
            Some(exists) => exists,
            None => return,
        };
        if !exists {
            m.use_gas(schedule.create_account);
            if m.sink.is_err() {
                return;
            }
            let created = self.create_account(ctx.frame, &params.callee, &receiver);
            if m.sink.push_result(created).is_none() {
                return;
            }
        }
        if m.sink.is_err() {
            return;
        }
        tracing::debug!("Self-destruct {} to {}", params.callee, receiver);
        m.sink
            .push_result(bequeath(ctx.frame, &params.callee, &receiver));
    }
}

/// Move the whole balance of `from` to `to` and delete `from`
fn bequeath(frame: &mut CallFrame<'_>, from: &Address, to: &Address) -> EvmResult<()> {
    let balance = must_get_account(&*frame, from)?.balance;
    let mut receiver = must_get_account(&*frame, to)?;
    receiver.add_to_balance(balance)?;
    frame.update_account(receiver)?;
    frame.remove_account(from)
}

/// Set the code of a freshly created contract
fn install_code(frame: &mut CallFrame<'_>, address: &Address, code: &[u8]) -> EvmResult<()> {
    let mut account = must_get_account(&*frame, address)?;
    if account.has_code() {
        return Err(EvmError::IllegalWrite);
    }
    account.code = code.to_vec();
    frame.update_account(account)
}

/// `length` bytes of `data` from `offset`, zero-padded past the end.
/// Starting past the end is an error.
fn subslice(data: &[u8], offset: u64, length: u64) -> EvmResult<Vec<u8>> {
    let size = data.len() as u64;
    if offset > size {
        return Err(EvmError::InputOutOfBounds);
    }
    if length > ABSOLUTE_MAX_CAPACITY {
        return Err(EvmError::MemoryOutOfBounds(format!(
            "cannot copy {} bytes",
            length
        )));
    }
    let end = offset.saturating_add(length).min(size);
    let mut slice = data[offset as usize..end as usize].to_vec();
    slice.resize(length as usize, 0);
    Ok(slice)
}

/// Exactly `size` bytes: `data` truncated or right-padded with zeros
fn fit(data: &[u8], size: u64) -> EvmResult<Vec<u8>> {
    if size > ABSOLUTE_MAX_CAPACITY {
        return Err(EvmError::MemoryOutOfBounds(format!(
            "cannot return {} bytes",
            size
        )));
    }
    let size = size as usize;
    let mut out = data[..data.len().min(size)].to_vec();
    out.resize(size, 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvmOptions;
    use crate::context::TestBlockchain;
    use crate::evm::Evm;
    use crate::math::I256;
    use crate::state::MemoryState;

    const CALLEE: Address = Address::from_bytes([0xCC; 20]);
    const CALLER: Address = Address::from_bytes([0xAA; 20]);

    /// PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
    const RETURN_TOP: [u8; 8] = [0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3];

    struct Outcome {
        result: EvmResult<Vec<u8>>,
        gas_left: Gas,
        state: MemoryState,
        events: Events,
    }

    fn execute_with(code: &[u8], gas: Gas, input: Vec<u8>, chain: &TestBlockchain) -> Outcome {
        let mut callee = Account::new(CALLEE);
        callee.balance = U256::from(100);
        let mut state = MemoryState::new()
            .with_account(callee)
            .with_account(Account::new(CALLER));
        let mut events = Events::new();
        let mut params = CallParams::new(CALLER, CALLEE, input, gas);
        let mut evm = Evm::new(EvmOptions::default());
        let result = evm.execute(&mut state, chain, &mut events, &mut params, code);
        Outcome {
            result,
            gas_left: params.gas,
            state,
            events,
        }
    }

    fn execute(code: &[u8]) -> Outcome {
        execute_with(code, 100_000, Vec::new(), &TestBlockchain::new(10, 1_000))
    }

    /// Run `code` and return the word it leaves on top of the stack
    fn eval(code: &[u8]) -> U256 {
        let mut code = code.to_vec();
        code.extend_from_slice(&RETURN_TOP);
        let output = execute(&code).result.unwrap();
        U256::from_big_endian(&output)
    }

    fn push32(value: U256) -> Vec<u8> {
        let mut code = vec![0x7F];
        code.extend_from_slice(Word::from_u256(value).as_bytes());
        code
    }

    fn neg(n: u64) -> U256 {
        I256::new(true, U256::from(n)).to_u256()
    }

    #[test]
    fn test_empty_code() {
        let outcome = execute(&[]);
        assert_eq!(outcome.result, Ok(Vec::new()));
        assert_eq!(outcome.gas_left, 100_000);
    }

    #[test]
    fn test_arithmetic() {
        // PUSH1 3, PUSH1 5, SUB -> 5 - 3
        assert_eq!(eval(&[0x60, 0x03, 0x60, 0x05, 0x03]), U256::from(2));
        // PUSH1 2, PUSH1 10, DIV
        assert_eq!(eval(&[0x60, 0x02, 0x60, 0x0A, 0x04]), U256::from(5));
        // division by zero
        assert_eq!(eval(&[0x60, 0x00, 0x60, 0x0A, 0x04]), U256::zero());
        assert_eq!(eval(&[0x60, 0x00, 0x60, 0x0A, 0x06]), U256::zero());
        // PUSH1 8, PUSH1 10, PUSH1 10, ADDMOD
        assert_eq!(eval(&[0x60, 0x08, 0x60, 0x0A, 0x60, 0x0A, 0x08]), U256::from(4));
        // PUSH1 10, PUSH1 2, EXP
        assert_eq!(eval(&[0x60, 0x0A, 0x60, 0x02, 0x0A]), U256::from(1024));
        // 0 - 1 wraps
        assert_eq!(eval(&[0x60, 0x01, 0x60, 0x00, 0x03]), U256::MAX);
    }

    #[test]
    fn test_signed_arithmetic() {
        let mut code = vec![0x60, 0x03];
        code.extend(push32(neg(10)));
        code.push(0x05); // SDIV
        assert_eq!(eval(&code), neg(3));

        let mut code = vec![0x60, 0x03];
        code.extend(push32(neg(10)));
        code.push(0x07); // SMOD
        assert_eq!(eval(&code), neg(1));

        let mut code = vec![0x60, 0x01];
        code.extend(push32(neg(1)));
        code.push(0x12); // SLT
        assert_eq!(eval(&code), U256::one());
    }

    #[test]
    fn test_sign_extend() {
        // PUSH1 0xFF, PUSH1 0, SIGNEXTEND
        assert_eq!(eval(&[0x60, 0xFF, 0x60, 0x00, 0x0B]), U256::MAX);
        // PUSH1 0x7F, PUSH1 0, SIGNEXTEND
        assert_eq!(eval(&[0x60, 0x7F, 0x60, 0x00, 0x0B]), U256::from(0x7F));
        // back >= 31 leaves the value alone
        assert_eq!(eval(&[0x60, 0xFF, 0x60, 0x1F, 0x0B]), U256::from(0xFF));
    }

    #[test]
    fn test_comparison_and_bits() {
        // PUSH1 2, PUSH1 1, LT -> 1 < 2
        assert_eq!(eval(&[0x60, 0x02, 0x60, 0x01, 0x10]), U256::one());
        assert_eq!(eval(&[0x60, 0x02, 0x60, 0x01, 0x11]), U256::zero());
        // PUSH1 0xAB, PUSH1 31, BYTE
        assert_eq!(eval(&[0x60, 0xAB, 0x60, 0x1F, 0x1A]), U256::from(0xAB));
        assert_eq!(eval(&[0x60, 0xAB, 0x60, 0x20, 0x1A]), U256::zero());
        // PUSH1 1, PUSH1 4, SHL
        assert_eq!(eval(&[0x60, 0x01, 0x60, 0x04, 0x1B]), U256::from(16));
        // PUSH1 0, ISZERO, NOT
        assert_eq!(eval(&[0x60, 0x00, 0x15, 0x19]), !U256::one());

        let mut code = push32(neg(16));
        code.extend([0x60, 0x02, 0x1D]); // SAR 2
        assert_eq!(eval(&code), neg(4));
    }

    #[test]
    fn test_sha3_of_empty_input() {
        // PUSH1 0, PUSH1 0, SHA3
        let hash = eval(&[0x60, 0x00, 0x60, 0x00, 0x20]);
        assert_eq!(Word::from_u256(hash), keccak256(&[]));
    }

    #[test]
    fn test_dup_and_swap() {
        // PUSH1 1, PUSH1 2, DUP2 -> 1
        assert_eq!(eval(&[0x60, 0x01, 0x60, 0x02, 0x81]), U256::one());
        // PUSH1 1, PUSH1 2, SWAP1 -> 1 on top
        assert_eq!(eval(&[0x60, 0x01, 0x60, 0x02, 0x90]), U256::one());
    }

    #[test]
    fn test_environment() {
        assert_eq!(eval(&[0x30]), CALLEE.to_word().to_u256());
        assert_eq!(eval(&[0x33]), CALLER.to_word().to_u256());
        assert_eq!(eval(&[0x32]), CALLER.to_word().to_u256());
        // PUSH20 callee, BALANCE
        let mut code = vec![0x73];
        code.extend_from_slice(CALLEE.as_bytes());
        code.push(0x31);
        assert_eq!(eval(&code), U256::from(100));
        // CODESIZE
        assert_eq!(eval(&[0x38]), U256::from(1 + RETURN_TOP.len() as u64));
        // PC, after two pushes
        assert_eq!(eval(&[0x60, 0x00, 0x50, 0x58]), U256::from(3));
    }

    #[test]
    fn test_balance_of_missing_account() {
        // PUSH1 0x42, BALANCE
        let outcome = execute(&[0x60, 0x42, 0x31, 0x00]);
        assert!(matches!(outcome.result, Err(EvmError::NonExistentAccount(_))));
    }

    #[test]
    fn test_extcodesize_and_hash_of_missing_account() {
        assert_eq!(eval(&[0x60, 0x42, 0x3B]), U256::zero());
        assert_eq!(eval(&[0x60, 0x42, 0x3F]), U256::zero());
    }

    #[test]
    fn test_calldata() {
        let mut input = vec![0u8; 32];
        input[31] = 0x2A;
        let mut code = vec![0x60, 0x00, 0x35];
        code.extend_from_slice(&RETURN_TOP);
        let outcome = execute_with(&code, 1000, input.clone(), &TestBlockchain::default());
        assert_eq!(outcome.result.unwrap(), input);

        // CALLDATALOAD at 16 pads with zeros
        let mut code = vec![0x60, 0x10, 0x35];
        code.extend_from_slice(&RETURN_TOP);
        let outcome = execute_with(&code, 1000, input.clone(), &TestBlockchain::default());
        let output = outcome.result.unwrap();
        assert_eq!(output[15], 0x2A);
        assert!(output[16..].iter().all(|b| *b == 0));

        // starting past the end fails
        let outcome = execute_with(&[0x60, 0x21, 0x35], 1000, input, &TestBlockchain::default());
        assert_eq!(outcome.result, Err(EvmError::InputOutOfBounds));
    }

    #[test]
    fn test_calldatacopy() {
        // PUSH1 3, PUSH1 1, PUSH1 0, CALLDATACOPY, PUSH1 3, PUSH1 0, RETURN
        let code = [0x60, 0x03, 0x60, 0x01, 0x60, 0x00, 0x37, 0x60, 0x03, 0x60, 0x00, 0xF3];
        let outcome = execute_with(&code, 1000, vec![9, 8, 7], &TestBlockchain::default());
        assert_eq!(outcome.result.unwrap(), vec![8, 7, 0]);
    }

    #[test]
    fn test_memory_ops() {
        // PUSH1 0x42, PUSH1 31, MSTORE8, PUSH1 0, MLOAD
        assert_eq!(eval(&[0x60, 0x42, 0x60, 0x1F, 0x53, 0x60, 0x00, 0x51]), U256::from(0x42));
        // PUSH1 1, PUSH1 0, MSTORE, MSIZE
        assert_eq!(eval(&[0x60, 0x01, 0x60, 0x00, 0x52, 0x59]), U256::from(32));
    }

    #[test]
    fn test_storage_persists() {
        // PUSH1 7, PUSH1 1, SSTORE, PUSH1 1, SLOAD
        let mut code = vec![0x60, 0x07, 0x60, 0x01, 0x55, 0x60, 0x01, 0x54];
        code.extend_from_slice(&RETURN_TOP);
        let outcome = execute(&code);
        assert_eq!(U256::from_big_endian(&outcome.result.unwrap()), U256::from(7));
        assert_eq!(
            outcome.state.get_storage(&CALLEE, &Word::ONE).unwrap(),
            Word::from_u64(7)
        );
    }

    #[test]
    fn test_jumps() {
        // PUSH1 4, JUMP, INVALID, JUMPDEST, PUSH1 1
        assert_eq!(eval(&[0x60, 0x04, 0x56, 0xFE, 0x5B, 0x60, 0x01]), U256::one());
        // PUSH1 0, PUSH1 6, JUMPI falls through
        assert_eq!(eval(&[0x60, 0x00, 0x60, 0x06, 0x57, 0x60, 0x02]), U256::from(2));
    }

    #[test]
    fn test_jump_into_push_data() {
        // PUSH1 4, JUMP, PUSH1 0x5B, STOP
        let outcome = execute(&[0x60, 0x04, 0x56, 0x60, 0x5B, 0x00]);
        assert_eq!(outcome.result, Err(EvmError::InvalidJumpDest(4)));
    }

    #[test]
    fn test_failures() {
        assert_eq!(execute(&[0x01]).result, Err(EvmError::DataStackUnderflow));
        assert_eq!(execute(&[0x0C]).result, Err(EvmError::UnknownOpcode(0x0C)));
        assert_eq!(execute(&[0x44]).result, Err(EvmError::UnknownOpcode(0x44)));
        assert_eq!(execute(&[0xFE]).result, Err(EvmError::ExecutionAborted));
    }

    #[test]
    fn test_revert_carries_output() {
        // PUSH1 0xAA, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, REVERT
        let outcome = execute(&[0x60, 0xAA, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xFD]);
        assert_eq!(outcome.result, Err(EvmError::ExecutionReverted(vec![0xAA])));
    }

    #[test]
    fn test_gas_accounting() {
        // PUSH1 1, PUSH1 2, ADD, STOP: two pushes, two pops and a push
        let code = [0x60, 0x01, 0x60, 0x02, 0x01, 0x00];
        let outcome = execute_with(&code, 10, Vec::new(), &TestBlockchain::default());
        assert_eq!(outcome.result, Ok(Vec::new()));
        assert_eq!(outcome.gas_left, 5);

        let outcome = execute_with(&code, 4, Vec::new(), &TestBlockchain::default());
        assert_eq!(outcome.result, Err(EvmError::InsufficientGas));
    }

    #[test]
    fn test_out_of_gas_leaves_state_untouched() {
        // PUSH1 7, PUSH1 1, SSTORE, then loop forever
        let code = [0x60, 0x07, 0x60, 0x01, 0x55, 0x5B, 0x60, 0x05, 0x56];
        let outcome = execute_with(&code, 50, Vec::new(), &TestBlockchain::default());
        assert_eq!(outcome.result, Err(EvmError::InsufficientGas));
        assert_eq!(outcome.state.storage_count(), 0);
        assert_eq!(outcome.gas_left, 0);
    }

    #[test]
    fn test_blockhash() {
        let chain = TestBlockchain::new(10, 1_000).with_block_hash(5, vec![0x77; 32]);
        let mut code = vec![0x60, 0x05, 0x40];
        code.extend_from_slice(&RETURN_TOP);
        let outcome = execute_with(&code, 1000, Vec::new(), &chain);
        assert_eq!(outcome.result.unwrap(), vec![0x77; 32]);

        let outcome = execute_with(&[0x60, 0x0A, 0x40], 1000, Vec::new(), &chain);
        assert_eq!(outcome.result, Err(EvmError::InvalidBlockNumber(10)));

        let far = TestBlockchain::new(300, 1_000);
        let outcome = execute_with(&[0x60, 0x0A, 0x40], 1000, Vec::new(), &far);
        assert_eq!(outcome.result, Err(EvmError::BlockNumberOutOfRange(10)));
    }

    #[test]
    fn test_block_info() {
        assert_eq!(eval(&[0x42]), U256::from(1_000));
        assert_eq!(eval(&[0x43]), U256::from(10));
        assert_eq!(eval(&[0x41]), U256::zero());
    }

    #[test]
    fn test_return_data_copy_out_of_bounds() {
        // PUSH1 1, PUSH1 0, PUSH1 0, RETURNDATACOPY
        let outcome = execute(&[0x60, 0x01, 0x60, 0x00, 0x60, 0x00, 0x3E]);
        assert_eq!(outcome.result, Err(EvmError::ReturnDataOutOfBounds));
        assert_eq!(eval(&[0x3D]), U256::zero());
    }

    #[test]
    fn test_copy_larger_than_memory_maximum_fails() {
        // PUSH4 0x7FFFFFFF, PUSH1 0, PUSH1 0, CALLDATACOPY
        let code = [0x63, 0x7F, 0xFF, 0xFF, 0xFF, 0x60, 0x00, 0x60, 0x00, 0x37, 0x00];
        let outcome = execute(&code);
        assert!(matches!(outcome.result, Err(EvmError::MemoryOutOfBounds(_))));
        assert_eq!(outcome.state.storage_count(), 0);
    }

    #[test]
    fn test_call_output_larger_than_memory_maximum_fails() {
        // STATICCALL CALLER with a return area of 0x7FFFFFFF bytes
        let mut code = vec![0x63, 0x7F, 0xFF, 0xFF, 0xFF, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x73];
        code.extend_from_slice(CALLER.as_bytes());
        code.extend_from_slice(&[0x61, 0xFF, 0xFF, 0xFA, 0x00]);
        let outcome = execute(&code);
        assert!(matches!(outcome.result, Err(EvmError::MemoryOutOfBounds(_))));
    }

    #[test]
    fn test_create_passes_init_code_as_input() {
        // init: CALLDATASIZE, PUSH1 0, SSTORE, STOP
        let init = [0x36, 0x60, 0x00, 0x55, 0x00];
        // PUSH5 init, PUSH1 0, MSTORE, PUSH1 5, PUSH1 27, PUSH1 0, CREATE, STOP
        let mut code = vec![0x64];
        code.extend_from_slice(&init);
        code.extend_from_slice(&[0x60, 0x00, 0x52, 0x60, 0x05, 0x60, 0x1B, 0x60, 0x00, 0xF0, 0x00]);
        let outcome = execute(&code);
        assert_eq!(outcome.result, Ok(Vec::new()));

        let created = CreateSequence::new(Vec::new()).next_address(&CALLEE);
        assert_eq!(
            outcome.state.get_storage(&created, &Word::ZERO).unwrap(),
            Word::from_u64(5)
        );
        let create_event = outcome
            .events
            .calls()
            .find(|event| event.call_type == CallType::Create)
            .unwrap();
        assert_eq!(create_event.input, init.to_vec());
    }

    #[test]
    fn test_log() {
        // PUSH1 0xAB, PUSH1 0, MSTORE8, PUSH1 9 (topic), PUSH1 1, PUSH1 0, LOG1
        let code = [0x60, 0xAB, 0x60, 0x00, 0x53, 0x60, 0x09, 0x60, 0x01, 0x60, 0x00, 0xA1, 0x00];
        let outcome = execute(&code);
        assert!(outcome.result.is_ok());
        let logs: Vec<_> = outcome.events.logs().cloned().collect();
        assert_eq!(
            logs,
            vec![LogEvent {
                address: CALLEE,
                topics: vec![Word::from_u64(9)],
                data: vec![0xAB],
            }]
        );
        assert_eq!(outcome.events.calls().count(), 1);
    }

    #[test]
    fn test_self_destruct() {
        // PUSH1 0x42, SELFDESTRUCT
        let outcome = execute(&[0x60, 0x42, 0xFF]);
        assert_eq!(outcome.result, Ok(Vec::new()));
        let mut heir = [0u8; 20];
        heir[19] = 0x42;
        let heir = outcome
            .state
            .get_account(&Address::from_bytes(heir))
            .unwrap()
            .unwrap();
        assert_eq!(heir.balance, U256::from(100));
        assert!(!outcome.state.account_exists(&CALLEE).unwrap());
    }

    #[test]
    fn test_subslice() {
        assert_eq!(subslice(&[1, 2, 3], 1, 4).unwrap(), vec![2, 3, 0, 0]);
        assert_eq!(subslice(&[1, 2, 3], 3, 2).unwrap(), vec![0, 0]);
        assert_eq!(subslice(&[1, 2, 3], 4, 1), Err(EvmError::InputOutOfBounds));
        assert!(matches!(
            subslice(&[], 0, u64::MAX),
            Err(EvmError::MemoryOutOfBounds(_))
        ));
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit(&[1, 2], 4).unwrap(), vec![1, 2, 0, 0]);
        assert_eq!(fit(&[1, 2, 3], 2).unwrap(), vec![1, 2]);
        assert!(fit(&[1], 0).unwrap().is_empty());
    }
}
