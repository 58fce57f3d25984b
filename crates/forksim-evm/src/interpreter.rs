//! EVM bytecode interpreter

use crate::context::{CallContext, CallKind, Environment};
use crate::error::{EvmError, EvmResult, ExecutionResult, Log};
use crate::gas::{self, cost};
use crate::hook::{FrameView, NoHook, OpcodeHook};
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::stack::{self, Stack, Word};
use crate::state::StateAccess;
use forksim_crypto::{keccak256, keccak256_concat};
use forksim_primitives::{Address, H256, U256};
use rlp::RlpStream;
use std::collections::HashSet;
use tracing::trace;

/// Why a frame stopped early
enum Interrupt<E> {
    /// EVM-level failure, confined to the frame
    Halt(EvmError),
    /// Hook failure, aborts every frame
    Hook(E),
}

impl<E> From<EvmError> for Interrupt<E> {
    fn from(err: EvmError) -> Self {
        Interrupt::Halt(err)
    }
}

type Step<E> = Result<(), Interrupt<E>>;

/// Interpreter state for one call frame
#[derive(Clone, Debug)]
pub struct Interpreter {
    /// Bytecode being executed
    code: Vec<u8>,
    /// Program counter
    pc: usize,
    /// Stack
    stack: Stack,
    /// Memory
    memory: Memory,
    /// Return data from last call
    return_data: Vec<u8>,
    /// Data handed back by RETURN
    output: Vec<u8>,
    /// Gas remaining
    gas: u64,
    /// Valid jump destinations
    jump_dests: HashSet<usize>,
    /// Execution stopped
    stopped: bool,
    /// Logs emitted
    logs: Vec<Log>,
}

impl Interpreter {
    /// Create a new interpreter with bytecode and gas
    pub fn new(code: Vec<u8>, gas: u64) -> Self {
        let jump_dests = Self::analyze_jump_dests(&code);
        Self {
            code,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            return_data: Vec::new(),
            output: Vec::new(),
            gas,
            jump_dests,
            stopped: false,
            logs: Vec::new(),
        }
    }

    /// Analyze bytecode for valid jump destinations
    fn analyze_jump_dests(code: &[u8]) -> HashSet<usize> {
        let mut dests = HashSet::new();
        let mut i = 0;

        while i < code.len() {
            let opcode = code[i];
            if opcode == Opcode::JUMPDEST as u8 {
                dests.insert(i);
            }
            // Skip PUSH operands
            if (0x60..=0x7F).contains(&opcode) {
                i += (opcode - 0x5F) as usize;
            }
            i += 1;
        }

        dests
    }

    /// Execute without a hook
    pub fn run_with_state<S: StateAccess>(
        &mut self,
        env: &Environment,
        state: &mut S,
    ) -> ExecutionResult {
        match self.run_hooked(env, state, &mut NoHook) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Execute until completion, calling `hook` before every opcode of this
    /// frame and of every nested frame.
    ///
    /// EVM failures come back as an unsuccessful [`ExecutionResult`]; a hook
    /// error comes back as `Err` with state left as it was at that point.
    pub fn run_hooked<S: StateAccess, H: OpcodeHook>(
        &mut self,
        env: &Environment,
        state: &mut S,
        hook: &mut H,
    ) -> Result<ExecutionResult, H::Error> {
        let initial_gas = self.gas;

        while !self.stopped && self.pc < self.code.len() {
            match self.step(env, state, hook) {
                Ok(()) => {}
                Err(Interrupt::Hook(err)) => return Err(err),
                Err(Interrupt::Halt(EvmError::Revert(data))) => {
                    return Ok(ExecutionResult::revert(
                        initial_gas - self.gas,
                        self.gas,
                        data,
                    ));
                }
                Err(Interrupt::Halt(err)) => {
                    trace!(depth = env.call.depth, pc = self.pc, %err, "frame halted");
                    return Ok(ExecutionResult::failure(initial_gas, err));
                }
            }
        }

        Ok(ExecutionResult::success(
            initial_gas - self.gas,
            self.gas,
            std::mem::take(&mut self.output),
            std::mem::take(&mut self.logs),
        ))
    }

    fn step<S: StateAccess, H: OpcodeHook>(
        &mut self,
        env: &Environment,
        state: &mut S,
        hook: &mut H,
    ) -> Step<H::Error> {
        let opcode_byte = self.code[self.pc];
        let opcode = Opcode::from_byte(opcode_byte).ok_or(EvmError::InvalidOpcode(opcode_byte))?;

        let frame = FrameView {
            opcode,
            address: env.call.address,
            stack: &self.stack,
            depth: env.call.depth,
            pc: self.pc,
        };
        hook.before_opcode(&frame, state).map_err(Interrupt::Hook)?;

        self.use_gas(gas::static_gas(opcode))?;
        self.pc += 1;
        self.execute(opcode, env, state, hook)
    }

    /// Use gas, returning error if insufficient
    fn use_gas(&mut self, amount: u64) -> EvmResult<()> {
        if self.gas < amount {
            return Err(EvmError::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }

    /// Charge for and grow memory to cover a range given as stack words
    fn memory_range(&mut self, offset: Word, size: Word) -> EvmResult<(usize, usize)> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let offset = stack::word_to_usize(&offset).ok_or(EvmError::OutOfGas)?;
        let size = stack::word_to_usize(&size).ok_or(EvmError::OutOfGas)?;
        let expansion = self.memory.expansion_gas(offset, size)?;
        self.use_gas(expansion)?;
        self.memory.expand(offset, size);
        Ok((offset, size))
    }

    fn binary_op(&mut self, f: impl FnOnce(Word, Word) -> Word) -> EvmResult<()> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.stack.push(f(a, b))
    }

    fn ternary_op(&mut self, f: impl FnOnce(Word, Word, Word) -> Word) -> EvmResult<()> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        let c = self.stack.pop()?;
        self.stack.push(f(a, b, c))
    }

    fn require_non_static(env: &Environment) -> EvmResult<()> {
        if env.call.is_static {
            return Err(EvmError::StaticCallViolation);
        }
        Ok(())
    }

    /// Execute an opcode; `self.pc` already points past it
    fn execute<S: StateAccess, H: OpcodeHook>(
        &mut self,
        opcode: Opcode,
        env: &Environment,
        state: &mut S,
        hook: &mut H,
    ) -> Step<H::Error> {
        match opcode {
            Opcode::STOP => self.stopped = true,

            // Arithmetic
            Opcode::ADD => self.binary_op(|a, b| a.overflowing_add(b).0)?,
            Opcode::MUL => self.binary_op(|a, b| a.overflowing_mul(b).0)?,
            Opcode::SUB => self.binary_op(|a, b| a.overflowing_sub(b).0)?,
            Opcode::DIV => self.binary_op(|a, b| a.checked_div(b).unwrap_or_default())?,
            Opcode::SDIV => self.binary_op(stack::sdiv)?,
            Opcode::MOD => self.binary_op(|a, b| a.checked_rem(b).unwrap_or_default())?,
            Opcode::SMOD => self.binary_op(stack::smod)?,
            Opcode::ADDMOD => self.ternary_op(stack::addmod)?,
            Opcode::MULMOD => self.ternary_op(stack::mulmod)?,
            Opcode::EXP => {
                let base = self.stack.pop()?;
                let exponent = self.stack.pop()?;
                self.use_gas(gas::exp_gas(&exponent))?;
                self.stack.push(stack::exp(base, exponent))?;
            }
            Opcode::SIGNEXTEND => self.binary_op(stack::signextend)?,

            // Comparison and bitwise
            Opcode::LT => self.binary_op(|a, b| bool_word(a < b))?,
            Opcode::GT => self.binary_op(|a, b| bool_word(a > b))?,
            Opcode::SLT => self.binary_op(|a, b| bool_word(stack::slt(&a, &b)))?,
            Opcode::SGT => self.binary_op(|a, b| bool_word(stack::sgt(&a, &b)))?,
            Opcode::EQ => self.binary_op(|a, b| bool_word(a == b))?,
            Opcode::ISZERO => {
                let a = self.stack.pop()?;
                self.stack.push_bool(a.is_zero())?;
            }
            Opcode::AND => self.binary_op(|a, b| a & b)?,
            Opcode::OR => self.binary_op(|a, b| a | b)?,
            Opcode::XOR => self.binary_op(|a, b| a ^ b)?,
            Opcode::NOT => {
                let a = self.stack.pop()?;
                self.stack.push(!a)?;
            }
            Opcode::BYTE => self.binary_op(stack::byte)?,
            Opcode::SHL => self.binary_op(stack::shl)?,
            Opcode::SHR => self.binary_op(stack::shr)?,
            Opcode::SAR => self.binary_op(stack::sar)?,

            Opcode::KECCAK256 => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let (offset, size) = self.memory_range(offset, size)?;
                self.use_gas(gas::sha3_word_gas(size))?;
                let hash = keccak256(&self.memory.load_slice(offset, size));
                self.stack.push(hash.to_u256())?;
            }

            // Environment
            Opcode::ADDRESS => self.stack.push(stack::address_to_word(&env.call.address))?,
            Opcode::BALANCE => {
                let address = self.stack.pop_address()?;
                let was_warm = state.warm_address(&address);
                self.use_gas(gas::account_access_gas(was_warm))?;
                self.stack.push(state.get_balance(&address)?)?;
            }
            Opcode::ORIGIN => self.stack.push(stack::address_to_word(&env.tx.origin))?,
            Opcode::CALLER => self.stack.push(stack::address_to_word(&env.call.caller))?,
            Opcode::CALLVALUE => self.stack.push(env.call.value)?,
            Opcode::CALLDATALOAD => {
                let offset = stack::word_to_usize_saturated(&self.stack.pop()?);
                let word = read_padded(&env.call.data, offset, 32);
                self.stack.push(U256::from_big_endian(&word))?;
            }
            Opcode::CALLDATASIZE => self.stack.push(U256::from(env.call.data.len()))?,
            Opcode::CALLDATACOPY => {
                let data = env.call.data.clone();
                self.copy_to_memory(&data)?;
            }
            Opcode::CODESIZE => self.stack.push(U256::from(self.code.len()))?,
            Opcode::CODECOPY => {
                let code = self.code.clone();
                self.copy_to_memory(&code)?;
            }
            Opcode::GASPRICE => self.stack.push(env.tx.gas_price)?,
            Opcode::EXTCODESIZE => {
                let address = self.stack.pop_address()?;
                let was_warm = state.warm_address(&address);
                self.use_gas(gas::account_access_gas(was_warm))?;
                let size = state.get_code(&address)?.len();
                self.stack.push(U256::from(size))?;
            }
            Opcode::EXTCODECOPY => {
                let address = self.stack.pop_address()?;
                let was_warm = state.warm_address(&address);
                self.use_gas(gas::account_access_gas(was_warm))?;
                let code = state.get_code(&address)?;
                self.copy_to_memory(&code)?;
            }
            Opcode::RETURNDATASIZE => self.stack.push(U256::from(self.return_data.len()))?,
            Opcode::RETURNDATACOPY => {
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let in_bounds = match offset.checked_add(size) {
                    Some(end) => end <= U256::from(self.return_data.len()),
                    None => false,
                };
                if !in_bounds {
                    return Err(EvmError::ReturnDataOutOfBounds.into());
                }
                let (dest, len) = self.memory_range(dest, size)?;
                self.use_gas(gas::copy_gas(len))?;
                let offset = stack::word_to_usize_saturated(&offset);
                let data = std::mem::take(&mut self.return_data);
                self.memory.copy_from(dest, &data, offset, len);
                self.return_data = data;
            }
            Opcode::EXTCODEHASH => {
                let address = self.stack.pop_address()?;
                let was_warm = state.warm_address(&address);
                self.use_gas(gas::account_access_gas(was_warm))?;
                let hash = if state.is_empty(&address)? {
                    H256::ZERO
                } else {
                    state.get_code_hash(&address)?
                };
                self.stack.push(hash.to_u256())?;
            }

            // Block
            Opcode::BLOCKHASH => {
                // No header source behind the fork; every hash reads as zero
                self.stack.pop()?;
                self.stack.push(U256::zero())?;
            }
            Opcode::COINBASE => self.stack.push(stack::address_to_word(&env.block.coinbase))?,
            Opcode::TIMESTAMP => self.stack.push(U256::from(env.block.timestamp))?,
            Opcode::NUMBER => self.stack.push(U256::from(env.block.number))?,
            Opcode::PREVRANDAO => self.stack.push(env.block.prevrandao.to_u256())?,
            Opcode::GASLIMIT => self.stack.push(U256::from(env.block.gas_limit))?,
            Opcode::CHAINID => self.stack.push(U256::from(env.block.chain_id))?,
            Opcode::SELFBALANCE => self.stack.push(state.get_balance(&env.call.address)?)?,
            Opcode::BASEFEE => self.stack.push(env.block.base_fee)?,

            // Stack, memory, storage and flow
            Opcode::POP => {
                self.stack.pop()?;
            }
            Opcode::MLOAD => {
                let offset = self.stack.pop()?;
                let (offset, _) = self.memory_range(offset, U256::from(32))?;
                self.stack.push(self.memory.load(offset))?;
            }
            Opcode::MSTORE => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (offset, _) = self.memory_range(offset, U256::from(32))?;
                self.memory.store(offset, &value);
            }
            Opcode::MSTORE8 => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (offset, _) = self.memory_range(offset, U256::one())?;
                self.memory.store8(offset, value.low_u32() as u8);
            }
            Opcode::SLOAD => {
                let key = stack::word_to_h256(&self.stack.pop()?);
                let was_warm = state.warm_storage(&env.call.address, &key);
                self.use_gas(gas::sload_gas(was_warm))?;
                let value = state.get_storage(&env.call.address, &key)?;
                self.stack.push(value.to_u256())?;
            }
            Opcode::SSTORE => self.sstore(env, state)?,
            Opcode::JUMP => {
                let dest = self.stack.pop()?;
                self.jump(dest)?;
            }
            Opcode::JUMPI => {
                let dest = self.stack.pop()?;
                let condition = self.stack.pop()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }
            Opcode::PC => self.stack.push(U256::from(self.pc - 1))?,
            Opcode::MSIZE => self.stack.push(U256::from(self.memory.size()))?,
            Opcode::GAS => self.stack.push(U256::from(self.gas))?,
            Opcode::JUMPDEST => {}
            Opcode::TLOAD => {
                let key = stack::word_to_h256(&self.stack.pop()?);
                let value = state.get_transient(&env.call.address, &key);
                self.stack.push(value.to_u256())?;
            }
            Opcode::TSTORE => {
                Self::require_non_static(env)?;
                let key = stack::word_to_h256(&self.stack.pop()?);
                let value = stack::word_to_h256(&self.stack.pop()?);
                state.set_transient(env.call.address, key, value);
            }
            Opcode::MCOPY => {
                let dest = self.stack.pop()?;
                let src = self.stack.pop()?;
                let size = self.stack.pop()?;
                if !size.is_zero() {
                    let reach = dest.max(src);
                    let (_, len) = self.memory_range(reach, size)?;
                    self.use_gas(gas::copy_gas(len))?;
                    let dest = stack::word_to_usize_saturated(&dest);
                    let src = stack::word_to_usize_saturated(&src);
                    self.memory.copy(dest, src, len);
                }
            }

            // Push, dup, swap
            Opcode::PUSH0 => self.stack.push(U256::zero())?,
            op if op.push_size() > 0 => {
                let size = op.push_size();
                let bytes = read_padded(&self.code, self.pc, size);
                self.stack.push(U256::from_big_endian(&bytes))?;
                self.pc += size;
            }
            op if op.dup_depth() > 0 => self.stack.dup(op.dup_depth())?,
            op if op.swap_depth() > 0 => self.stack.swap(op.swap_depth())?,

            // Logging
            op if op.is_log() => {
                Self::require_non_static(env)?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let mut topics = Vec::with_capacity(op.log_topics());
                for _ in 0..op.log_topics() {
                    topics.push(stack::word_to_h256(&self.stack.pop()?));
                }
                let (offset, size) = self.memory_range(offset, size)?;
                self.use_gas(gas::log_data_gas(size))?;
                self.logs.push(Log {
                    address: env.call.address,
                    topics,
                    data: self.memory.load_slice(offset, size),
                });
            }

            // System
            Opcode::CREATE | Opcode::CREATE2 => self.create(opcode, env, state, hook)?,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => {
                self.call(opcode, env, state, hook)?
            }
            Opcode::RETURN => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let (offset, size) = self.memory_range(offset, size)?;
                self.output = self.memory.load_slice(offset, size);
                self.stopped = true;
            }
            Opcode::REVERT => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let (offset, size) = self.memory_range(offset, size)?;
                return Err(EvmError::Revert(self.memory.load_slice(offset, size)).into());
            }
            Opcode::SELFDESTRUCT => {
                Self::require_non_static(env)?;
                let beneficiary = self.stack.pop_address()?;
                let mut charge = 0;
                if !state.warm_address(&beneficiary) {
                    charge += cost::COLD_ACCOUNT_ACCESS;
                }
                let balance = state.get_balance(&env.call.address)?;
                if !balance.is_zero() && state.is_empty(&beneficiary)? {
                    charge += cost::SELFDESTRUCT_NEW_ACCOUNT;
                }
                self.use_gas(charge)?;
                state.selfdestruct(&env.call.address, &beneficiary)?;
                self.stopped = true;
            }
            Opcode::INVALID => return Err(EvmError::InvalidOpcode(opcode as u8).into()),

            _ => return Err(EvmError::InvalidOpcode(opcode as u8).into()),
        }

        Ok(())
    }

    fn jump(&mut self, dest: Word) -> EvmResult<()> {
        let target = stack::word_to_usize_saturated(&dest);
        if !self.jump_dests.contains(&target) {
            return Err(EvmError::InvalidJump(target));
        }
        self.pc = target;
        Ok(())
    }

    /// Shared tail of CALLDATACOPY, CODECOPY and EXTCODECOPY
    fn copy_to_memory(&mut self, source: &[u8]) -> EvmResult<()> {
        let dest = self.stack.pop()?;
        let offset = self.stack.pop()?;
        let size = self.stack.pop()?;
        let (dest, len) = self.memory_range(dest, size)?;
        self.use_gas(gas::copy_gas(len))?;
        let offset = stack::word_to_usize_saturated(&offset);
        self.memory.copy_from(dest, source, offset, len);
        Ok(())
    }

    fn sstore<S: StateAccess>(&mut self, env: &Environment, state: &mut S) -> EvmResult<()> {
        Self::require_non_static(env)?;
        if self.gas <= cost::SSTORE_SENTRY {
            return Err(EvmError::OutOfGas);
        }
        let key = stack::word_to_h256(&self.stack.pop()?);
        let new = self.stack.pop()?;
        let address = env.call.address;

        let was_warm = state.warm_storage(&address, &key);
        let original = state.get_original_storage(&address, &key)?.to_u256();
        let current = state.get_storage(&address, &key)?.to_u256();
        let (charge, refund) = gas::sstore_gas(&original, &current, &new, was_warm);
        self.use_gas(charge)?;
        if refund > 0 {
            state.add_refund(refund.unsigned_abs());
        } else if refund < 0 {
            state.sub_refund(refund.unsigned_abs());
        }
        state.set_storage(address, key, H256::from_u256(new))
    }

    fn call<S: StateAccess, H: OpcodeHook>(
        &mut self,
        opcode: Opcode,
        env: &Environment,
        state: &mut S,
        hook: &mut H,
    ) -> Step<H::Error> {
        let gas_arg = self.stack.pop()?;
        let to = self.stack.pop_address()?;
        let value = match opcode {
            Opcode::CALL | Opcode::CALLCODE => self.stack.pop()?,
            _ => U256::zero(),
        };
        let in_offset = self.stack.pop()?;
        let in_size = self.stack.pop()?;
        let out_offset = self.stack.pop()?;
        let out_size = self.stack.pop()?;

        if opcode == Opcode::CALL && env.call.is_static && !value.is_zero() {
            return Err(EvmError::StaticCallViolation.into());
        }

        let (in_offset, in_len) = self.memory_range(in_offset, in_size)?;
        let (out_offset, out_len) = self.memory_range(out_offset, out_size)?;

        let mut charge = gas::account_access_gas(state.warm_address(&to));
        if !value.is_zero() {
            charge += cost::CALL_VALUE;
            if opcode == Opcode::CALL && state.is_empty(&to)? {
                charge += cost::CALL_NEW_ACCOUNT;
            }
        }
        self.use_gas(charge)?;

        let requested = if gas_arg > U256::from(u64::MAX) {
            u64::MAX
        } else {
            gas_arg.low_u64()
        };
        let forwarded = requested.min(gas::all_but_one_64th(self.gas));
        self.use_gas(forwarded)?;
        let child_gas = if value.is_zero() {
            forwarded
        } else {
            forwarded + cost::CALL_STIPEND
        };

        let input = self.memory.load_slice(in_offset, in_len);
        self.return_data.clear();

        if env.call.depth >= cost::MAX_CALL_DEPTH
            || (!value.is_zero() && state.get_balance(&env.call.address)? < value)
        {
            self.gas += child_gas;
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let (address, caller, call_value, kind, is_static) = match opcode {
            Opcode::CALL => (to, env.call.address, value, CallKind::Call, env.call.is_static),
            Opcode::CALLCODE => (
                env.call.address,
                env.call.address,
                value,
                CallKind::CallCode,
                env.call.is_static,
            ),
            Opcode::DELEGATECALL => (
                env.call.address,
                env.call.caller,
                env.call.value,
                CallKind::DelegateCall,
                env.call.is_static,
            ),
            _ => (to, env.call.address, U256::zero(), CallKind::StaticCall, true),
        };

        let checkpoint = state.snapshot();
        if opcode == Opcode::CALL {
            state.transfer(&env.call.address, &to, value)?;
        }

        let code = state.get_code(&to)?;
        let result = if code.is_empty() {
            ExecutionResult::success(0, child_gas, Vec::new(), Vec::new())
        } else {
            let child_env = env.with_call(CallContext {
                address,
                code_address: to,
                caller,
                value: call_value,
                data: input,
                gas: child_gas,
                is_static,
                depth: env.call.depth + 1,
                kind,
            });
            Interpreter::new(code, child_gas)
                .run_hooked(&child_env, state, hook)
                .map_err(Interrupt::Hook)?
        };

        if result.success {
            self.logs.extend(result.logs);
        } else {
            state.revert_to_snapshot(checkpoint);
        }
        self.gas += result.gas_left;
        let copy_len = out_len.min(result.output.len());
        self.memory.store_slice(out_offset, &result.output[..copy_len]);
        self.return_data = result.output;
        self.stack.push_bool(result.success)?;
        Ok(())
    }

    fn create<S: StateAccess, H: OpcodeHook>(
        &mut self,
        opcode: Opcode,
        env: &Environment,
        state: &mut S,
        hook: &mut H,
    ) -> Step<H::Error> {
        Self::require_non_static(env)?;
        let value = self.stack.pop()?;
        let offset = self.stack.pop()?;
        let size = self.stack.pop()?;
        let salt = match opcode {
            Opcode::CREATE2 => Some(stack::word_to_h256(&self.stack.pop()?)),
            _ => None,
        };

        let (offset, len) = self.memory_range(offset, size)?;
        if len > cost::MAX_INIT_CODE_SIZE {
            return Err(EvmError::MaxInitCodeSizeExceeded.into());
        }
        let mut charge = gas::initcode_gas(len);
        if salt.is_some() {
            charge += gas::sha3_word_gas(len);
        }
        self.use_gas(charge)?;

        let init_code = self.memory.load_slice(offset, len);
        self.return_data.clear();

        let sender = env.call.address;
        let nonce = state.get_nonce(&sender)?;
        if env.call.depth >= cost::MAX_CALL_DEPTH
            || state.get_balance(&sender)? < value
            || nonce == u64::MAX
        {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let address = match salt {
            Some(salt) => create2_address(&sender, &salt, &init_code),
            None => create_address(&sender, nonce),
        };
        state.increment_nonce(&sender)?;
        state.warm_address(&address);

        let child_gas = gas::all_but_one_64th(self.gas);
        self.use_gas(child_gas)?;

        if state.get_nonce(&address)? != 0 || !state.get_code(&address)?.is_empty() {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let checkpoint = state.snapshot();
        state.create_account(&address)?;
        state.transfer(&sender, &address, value)?;

        let child_env = env.with_call(CallContext {
            address,
            code_address: address,
            caller: sender,
            value,
            data: Vec::new(),
            gas: child_gas,
            is_static: false,
            depth: env.call.depth + 1,
            kind: if salt.is_some() {
                CallKind::Create2
            } else {
                CallKind::Create
            },
        });
        let result = Interpreter::new(init_code, child_gas)
            .run_hooked(&child_env, state, hook)
            .map_err(Interrupt::Hook)?;

        if !result.success {
            state.revert_to_snapshot(checkpoint);
            self.gas += result.gas_left;
            if result.is_revert() {
                self.return_data = result.output;
            }
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let code = result.output;
        let deposit = cost::CODE_DEPOSIT * code.len() as u64;
        let deployable = code.len() <= cost::MAX_CODE_SIZE
            && code.first() != Some(&0xEF)
            && result.gas_left >= deposit;
        if !deployable {
            state.revert_to_snapshot(checkpoint);
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        state.set_code(&address, code)?;
        self.gas += result.gas_left - deposit;
        self.logs.extend(result.logs);
        self.stack.push(stack::address_to_word(&address))?;
        Ok(())
    }

    /// Get remaining gas
    pub fn gas_remaining(&self) -> u64 {
        self.gas
    }

    /// Return data of the last nested call
    pub fn return_data(&self) -> &[u8] {
        &self.return_data
    }
}

fn bool_word(value: bool) -> Word {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

/// `len` bytes of `data` from `offset`, zero padded past the end
fn read_padded(data: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < data.len() {
        let available = (data.len() - offset).min(len);
        out[..available].copy_from_slice(&data[offset..offset + available]);
    }
    out
}

/// CREATE address: keccak256(RLP([sender, nonce]))[12:]
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.as_bytes().to_vec());
    if nonce == 0 {
        stream.append_empty_data();
    } else {
        stream.append(&nonce);
    }
    let hash = keccak256(&stream.out());
    Address::from_word(hash.as_bytes())
}

/// CREATE2 address: keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12:]
pub fn create2_address(sender: &Address, salt: &H256, init_code: &[u8]) -> Address {
    let code_hash = keccak256(init_code);
    let hash = keccak256_concat(&[
        &[0xff],
        sender.as_bytes(),
        salt.as_bytes(),
        code_hash.as_bytes(),
    ]);
    Address::from_word(hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournaledState;
    use forksim_storage::{StateDb, StateReader, StateWriter, WorkingState};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn run_code(code: &[u8], gas: u64) -> ExecutionResult {
        let mut db = StateDb::new().open_empty();
        run_in(&mut db, code, gas)
    }

    fn run_in(db: &mut WorkingState, code: &[u8], gas: u64) -> ExecutionResult {
        let mut state = JournaledState::new(&mut *db);
        let env = Environment {
            call: CallContext::new(addr(0xc0de), addr(0xca11), U256::zero(), vec![], gas),
            ..Default::default()
        };
        let result = Interpreter::new(code.to_vec(), gas).run_with_state(&env, &mut state);
        if result.success {
            let writes = state.into_writes();
            writes.apply_to(db).unwrap();
        }
        result
    }

    /// Code that returns the 32-byte word on top of the stack
    fn return_top() -> Vec<u8> {
        vec![0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3]
    }

    fn returned_word(result: &ExecutionResult) -> U256 {
        assert!(result.success, "{:?}", result.halt);
        U256::from_big_endian(&result.output)
    }

    #[test]
    fn test_stop() {
        let result = run_code(&[0x00], 1000);
        assert!(result.success);
        assert_eq!(result.gas_used, 0);
    }

    #[test]
    fn test_arithmetic() {
        // PUSH1 3, PUSH1 10, SUB -> 7
        let mut code = vec![0x60, 0x03, 0x60, 0x0A, 0x03];
        code.extend(return_top());
        assert_eq!(returned_word(&run_code(&code, 10_000)), U256::from(7));

        // 0 - 1 wraps
        let mut code = vec![0x60, 0x01, 0x60, 0x00, 0x03];
        code.extend(return_top());
        assert_eq!(returned_word(&run_code(&code, 10_000)), U256::MAX);

        // PUSH1 0, PUSH1 5, DIV -> 0
        let mut code = vec![0x60, 0x00, 0x60, 0x05, 0x04];
        code.extend(return_top());
        assert_eq!(returned_word(&run_code(&code, 10_000)), U256::zero());
    }

    #[test]
    fn test_exp_charges_per_byte() {
        // PUSH1 2, PUSH1 3, EXP (3 ** 2), STOP
        let result = run_code(&[0x60, 0x02, 0x60, 0x03, 0x0A, 0x00], 10_000);
        assert!(result.success);
        assert_eq!(result.gas_used, 3 + 3 + 10 + 50);
    }

    #[test]
    fn test_jumps() {
        // PUSH1 4, JUMP, INVALID, JUMPDEST, STOP
        assert!(run_code(&[0x60, 0x04, 0x56, 0xFE, 0x5B, 0x00], 1000).success);
        // PUSH1 0, PUSH1 6, JUMPI, STOP, INVALID, JUMPDEST
        assert!(run_code(&[0x60, 0x00, 0x60, 0x06, 0x57, 0x00, 0x5B], 1000).success);

        // Jump into PUSH data
        let result = run_code(&[0x60, 0x03, 0x56, 0x60, 0x5B, 0x00], 1000);
        assert_eq!(result.halt, Some(EvmError::InvalidJump(3)));
        assert_eq!(result.gas_used, 1000);
    }

    #[test]
    fn test_return_and_revert() {
        let result = run_code(&[0x60, 0x04, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3], 10_000);
        assert_eq!(result.output.len(), 32);
        assert_eq!(result.output[31], 4);

        // PUSH1 0xAA, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, REVERT
        let result = run_code(&[0x60, 0xAA, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xFD], 10_000);
        assert!(result.is_revert());
        assert_eq!(result.output, vec![0xAA]);
        assert!(result.gas_left > 0);
    }

    #[test]
    fn test_out_of_gas() {
        let result = run_code(&[0x60, 0x01, 0x60, 0x01, 0x01], 5);
        assert_eq!(result.halt, Some(EvmError::OutOfGas));
        assert_eq!(result.gas_left, 0);
    }

    #[test]
    fn test_push_past_end_is_zero_padded() {
        // PUSH2 with a single operand byte
        let mut db = StateDb::new().open_empty();
        let result = run_in(&mut db, &[0x61, 0x01], 100);
        assert!(result.success);
    }

    #[test]
    fn test_calldata() {
        let mut db = StateDb::new().open_empty();
        let mut state = JournaledState::new(&mut db);
        let env = Environment {
            call: CallContext::new(addr(1), addr(2), U256::zero(), vec![0xAB; 4], 10_000),
            ..Default::default()
        };
        // PUSH1 0, CALLDATALOAD, return it
        let mut code = vec![0x60, 0x00, 0x35];
        code.extend(return_top());
        let result = Interpreter::new(code, 10_000).run_with_state(&env, &mut state);
        assert_eq!(&result.output[..5], &[0xAB, 0xAB, 0xAB, 0xAB, 0x00]);
    }

    #[test]
    fn test_sload_cold_then_warm() {
        let mut db = StateDb::new().open_empty();
        db.set_storage(addr(0xc0de), H256::ZERO, H256::from_low_u64_be(9)).unwrap();
        // PUSH1 0, SLOAD, PUSH1 0, SLOAD, ADD, return it
        let mut code = vec![0x60, 0x00, 0x54, 0x60, 0x00, 0x54, 0x01];
        code.extend(return_top());
        let result = run_in(&mut db, &code, 100_000);
        assert_eq!(returned_word(&result), U256::from(18));
        let body = 3 + 2100 + 3 + 100 + 3;
        let ret = 3 + (3 + 3) + 3 + 3;
        assert_eq!(result.gas_used, body + ret);
    }

    #[test]
    fn test_sstore_and_refund() {
        let mut db = StateDb::new().open_empty();
        // PUSH1 1, PUSH1 0, SSTORE, PUSH1 0, PUSH1 0, SSTORE, STOP
        let code = [0x60, 0x01, 0x60, 0x00, 0x55, 0x60, 0x00, 0x60, 0x00, 0x55, 0x00];
        let mut state = JournaledState::new(&mut db);
        let env = Environment {
            call: CallContext::new(addr(1), addr(2), U256::zero(), vec![], 100_000),
            ..Default::default()
        };
        let result = Interpreter::new(code.to_vec(), 100_000).run_with_state(&env, &mut state);
        assert!(result.success);
        assert_eq!(result.gas_used, 3 + 3 + 22100 + 3 + 3 + 100);
        assert_eq!(state.refund(), 19900);
    }

    #[test]
    fn test_sstore_sentry() {
        let code = [0x60, 0x01, 0x60, 0x00, 0x55];
        let result = run_code(&code, 2306);
        assert_eq!(result.halt, Some(EvmError::OutOfGas));
    }

    #[test]
    fn test_static_context_rejects_writes() {
        let mut db = StateDb::new().open_empty();
        let mut state = JournaledState::new(&mut db);
        let env = Environment {
            call: CallContext::new_static(addr(1), addr(2), vec![], 100_000),
            ..Default::default()
        };
        let code = vec![0x60, 0x01, 0x60, 0x00, 0x55];
        let result = Interpreter::new(code, 100_000).run_with_state(&env, &mut state);
        assert_eq!(result.halt, Some(EvmError::StaticCallViolation));
    }

    #[test]
    fn test_logs() {
        // PUSH1 0x42, PUSH1 0, MSTORE8, PUSH1 7 (topic), PUSH1 1, PUSH1 0, LOG1, STOP
        let code = [0x60, 0x42, 0x60, 0x00, 0x53, 0x60, 0x07, 0x60, 0x01, 0x60, 0x00, 0xA1, 0x00];
        let result = run_code(&code, 10_000);
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].address, addr(0xc0de));
        assert_eq!(result.logs[0].topics, vec![H256::from_low_u64_be(7)]);
        assert_eq!(result.logs[0].data, vec![0x42]);
    }

    #[test]
    fn test_transient_storage() {
        // PUSH1 5, PUSH1 1, TSTORE, PUSH1 1, TLOAD, return it
        let mut code = vec![0x60, 0x05, 0x60, 0x01, 0x5D, 0x60, 0x01, 0x5C];
        code.extend(return_top());
        assert_eq!(returned_word(&run_code(&code, 10_000)), U256::from(5));
    }

    /// Caller code: CALL(gas, callee, 0, 0, 0, 0, 32) then return memory[0..32]
    fn call_and_return(callee: Address, opcode: u8) -> Vec<u8> {
        let mut code = vec![0x60, 0x20, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00];
        if opcode == 0xF1 || opcode == 0xF2 {
            code.extend([0x60, 0x00]);
        }
        code.push(0x73);
        code.extend_from_slice(callee.as_bytes());
        code.extend([0x5A, opcode, 0x50, 0x60, 0x20, 0x60, 0x00, 0xF3]);
        code
    }

    #[test]
    fn test_nested_call_returns_data() {
        let mut db = StateDb::new().open_empty();
        let mut callee = vec![0x60, 0x2A];
        callee.extend(return_top());
        db.set_account_code(&addr(0xbeef), callee).unwrap();

        let result = run_in(&mut db, &call_and_return(addr(0xbeef), 0xF1), 100_000);
        assert_eq!(returned_word(&result), U256::from(42));
    }

    #[test]
    fn test_reverted_child_state_is_rolled_back() {
        let mut db = StateDb::new().open_empty();
        // SSTORE(0, 1) then REVERT(0, 0)
        let callee = vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x60, 0x00, 0x60, 0x00, 0xFD];
        db.set_account_code(&addr(0xbeef), callee).unwrap();

        let result = run_in(&mut db, &call_and_return(addr(0xbeef), 0xF1), 100_000);
        assert!(result.success);
        assert_eq!(db.get_storage(&addr(0xbeef), &H256::ZERO).unwrap(), H256::ZERO);
    }

    #[test]
    fn test_delegatecall_uses_caller_storage() {
        let mut db = StateDb::new().open_empty();
        // SSTORE(0, 7), STOP
        let callee = vec![0x60, 0x07, 0x60, 0x00, 0x55, 0x00];
        db.set_account_code(&addr(0xbeef), callee).unwrap();

        let result = run_in(&mut db, &call_and_return(addr(0xbeef), 0xF4), 100_000);
        assert!(result.success);
        assert_eq!(
            db.get_storage(&addr(0xc0de), &H256::ZERO).unwrap(),
            H256::from_low_u64_be(7)
        );
        assert_eq!(db.get_storage(&addr(0xbeef), &H256::ZERO).unwrap(), H256::ZERO);
    }

    #[test]
    fn test_staticcall_blocks_child_writes() {
        let mut db = StateDb::new().open_empty();
        let callee = vec![0x60, 0x07, 0x60, 0x00, 0x55, 0x00];
        db.set_account_code(&addr(0xbeef), callee).unwrap();

        let result = run_in(&mut db, &call_and_return(addr(0xbeef), 0xFA), 100_000);
        assert!(result.success);
        assert_eq!(db.get_storage(&addr(0xbeef), &H256::ZERO).unwrap(), H256::ZERO);
    }

    #[test]
    fn test_call_to_empty_account_succeeds() {
        let result = run_code(&call_and_return(addr(0x01), 0xF1), 100_000);
        assert_eq!(returned_word(&result), U256::zero());
    }

    #[test]
    fn test_create_deploys_code() {
        let mut db = StateDb::new().open_empty();
        // initcode: PUSH1 0xFE, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, RETURN
        let init: [u8; 10] = [0x60, 0xFE, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xF3];
        // PUSH10 init, PUSH1 0, MSTORE, PUSH1 10, PUSH1 22, PUSH1 0, CREATE, return it
        let mut code = vec![0x69];
        code.extend(init);
        code.extend([0x60, 0x00, 0x52, 0x60, 0x0A, 0x60, 0x16, 0x60, 0x00, 0xF0]);
        code.extend(return_top());

        let result = run_in(&mut db, &code, 200_000);
        let created = stack::word_to_address(&returned_word(&result));
        assert_eq!(created, create_address(&addr(0xc0de), 0));
        assert_eq!(db.get_account_code(&created).unwrap(), vec![0xFE]);
        assert_eq!(db.get_nonce(&created).unwrap(), 1);
        assert_eq!(db.get_nonce(&addr(0xc0de)).unwrap(), 1);
    }

    #[test]
    fn test_create_address_vectors() {
        let sender = Address::from_hex("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        assert_eq!(
            create_address(&sender, 0),
            Address::from_hex("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap()
        );
        assert_eq!(
            create_address(&sender, 1),
            Address::from_hex("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap()
        );
    }

    #[test]
    fn test_create2_address_vector() {
        assert_eq!(
            create2_address(&Address::ZERO, &H256::ZERO, &[0x00]),
            Address::from_hex("0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38").unwrap()
        );
    }

    struct FailOnSload;

    impl OpcodeHook for FailOnSload {
        type Error = String;

        fn before_opcode<S: StateAccess>(
            &mut self,
            frame: &FrameView<'_>,
            _state: &mut S,
        ) -> Result<(), String> {
            if frame.opcode == Opcode::SLOAD {
                return Err(format!("sload at depth {}", frame.depth));
            }
            Ok(())
        }
    }

    #[test]
    fn test_hook_error_aborts_all_frames() {
        let mut db = StateDb::new().open_empty();
        db.set_account_code(&addr(0xbeef), vec![0x60, 0x00, 0x54, 0x00]).unwrap();
        let mut state = JournaledState::new(&mut db);
        let env = Environment {
            call: CallContext::new(addr(0xc0de), addr(1), U256::zero(), vec![], 100_000),
            ..Default::default()
        };
        let err = Interpreter::new(call_and_return(addr(0xbeef), 0xF1), 100_000)
            .run_hooked(&env, &mut state, &mut FailOnSload)
            .unwrap_err();
        assert_eq!(err, "sload at depth 1");
    }

    #[test]
    fn test_balance_is_cold_then_warm() {
        // PUSH1 9, BALANCE, PUSH1 9, BALANCE, STOP
        let result = run_code(&[0x60, 0x09, 0x31, 0x60, 0x09, 0x31, 0x00], 10_000);
        assert_eq!(result.gas_used, 3 + 2600 + 3 + 100);
    }

    #[test]
    fn test_extcodehash_of_missing_account() {
        let mut code = vec![0x60, 0x09, 0x3F];
        code.extend(return_top());
        assert_eq!(returned_word(&run_code(&code, 10_000)), U256::zero());
    }

    #[test]
    fn test_selfdestruct_moves_balance() {
        let mut db = StateDb::new().open_empty();
        db.set_balance(&addr(0xc0de), U256::from(10)).unwrap();
        // PUSH1 0x77, SELFDESTRUCT
        let result = run_in(&mut db, &[0x60, 0x77, 0xFF], 100_000);
        assert!(result.success);
        assert_eq!(db.get_balance(&addr(0x77)).unwrap(), U256::from(10));
        assert_eq!(db.get_balance(&addr(0xc0de)).unwrap(), U256::zero());
    }
}
