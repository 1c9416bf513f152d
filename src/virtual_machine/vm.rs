//! Core virtual machine implementation.
//!
//! The VM drives a decoded [`Program`] against a privately owned [`MachineState`]
//! with a fetch-resolve-execute loop. All arithmetic uses wrapping semantics, so
//! overflow is never a fault.

mod config;
mod memory;

pub use config::{DEFAULT_MAX_MEMORY, MAX_MEMORY_VAR, MAX_STACK_DEPTH_VAR, VmConfig};

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::stack::StackUnderflow;
use crate::virtual_machine::state::{Environment, MachineState};
use crate::virtual_machine::word::{WORD_BITS, Word};
use crate::{debug, error, info};
use memory::Memory;
use std::sync::Arc;

/// Result of a single [`VM::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The machine is still running.
    Continue,
    /// The machine has stopped, explicitly or by running off the end of the program.
    Halted,
}

/// Bytecode virtual machine.
///
/// Owns a private copy of its state and environment. Whatever the caller passed in
/// at construction is cloned into fresh containers and never touched again.
///
/// A VM that returned an error from [`run`](Self::run) or [`step`](Self::step) is
/// left exactly as it was after the last committed step and should be discarded.
#[derive(Debug)]
pub struct VM {
    /// Shared, read-only program.
    program: Arc<Program>,
    /// Private working state.
    state: MachineState,
    /// Private copy of the execution context.
    environment: Environment,
    config: VmConfig,
    /// Number of opcodes executed so far.
    steps: u64,
}

impl VM {
    /// Creates a VM with the default environment and initial state.
    pub fn new(program: Arc<Program>) -> Self {
        Self::new_with_init(program, &Environment::default(), &MachineState::default())
    }

    /// Creates a VM starting from copies of `environment` and `initial_state`.
    ///
    /// Does not execute anything.
    pub fn new_with_init(
        program: Arc<Program>,
        environment: &Environment,
        initial_state: &MachineState,
    ) -> Self {
        Self {
            program,
            state: initial_state.clone(),
            environment: *environment,
            config: VmConfig::default(),
            steps: 0,
        }
    }

    /// Replaces the execution policy.
    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// Current (or final) machine state.
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Consumes the VM and returns its final state.
    pub fn into_state(self) -> MachineState {
        self.state
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Number of opcodes executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped
    }

    /// Executes until the machine stops or an opcode fails.
    ///
    /// Calling `run` on a stopped machine does nothing and returns `Ok(())`.
    pub fn run(&mut self) -> Result<(), VMError> {
        if self.state.stopped {
            return Ok(());
        }
        info!(
            "running program: {} opcodes, {} bytes",
            self.program.len(),
            self.program.len_bytes()
        );
        while self.step()? == StepOutcome::Continue {}
        info!("halted at pc={} after {} steps", self.state.pc, self.steps);
        Ok(())
    }

    /// Like [`run`](Self::run), but fails with [`VMError::StepLimitExceeded`] if the
    /// machine is still running after `max_steps` opcodes.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), VMError> {
        for _ in 0..max_steps {
            if self.step()? == StepOutcome::Halted {
                return Ok(());
            }
        }
        if self.state.stopped {
            Ok(())
        } else {
            error!("step limit {} exceeded at pc={}", max_steps, self.state.pc);
            Err(VMError::StepLimitExceeded { limit: max_steps })
        }
    }

    /// Executes at most one opcode.
    ///
    /// Reaching the end of the program stops the machine without an explicit `STOP`.
    pub fn step(&mut self) -> Result<StepOutcome, VMError> {
        if self.state.stopped || self.halt_if_past_end() {
            return Ok(StepOutcome::Halted);
        }

        let offset = self.state.pc;
        let Some((index, opcode)) = self
            .program
            .index_at(offset)
            .and_then(|index| self.program.opcodes().get(index).map(|op| (index, op)))
        else {
            error!("pc={} is not an opcode boundary", offset);
            return Err(VMError::InvalidPC { pc: offset });
        };

        debug!("{:04}: {}", offset, opcode);

        // Built-ins declare their stack effect and are rejected before they run.
        // Host instructions are checked afterwards and rolled back.
        let limit = self.config.max_stack_depth;
        let mut snapshot = None;
        if let Some(limit) = limit {
            let available = self.state.stack.len();
            let inputs = opcode.stack_inputs();
            match opcode.stack_outputs() {
                Some(outputs) if available >= inputs => {
                    check_depth(available - inputs + outputs, limit, offset)?;
                }
                Some(_) => {}
                None => snapshot = Some(self.state.clone()),
            }
        }

        let mut executor = Executor {
            state: &mut self.state,
            environment: &self.environment,
            config: &self.config,
            opcode,
            offset,
            index,
        };
        executor
            .execute()
            .inspect_err(|err| error!("execution failed: {}", err))?;

        if let (Some(limit), Some(saved)) = (limit, snapshot) {
            let depth = self.state.stack.len();
            if let Err(err) = check_depth(depth, limit, offset) {
                self.state = saved;
                return Err(err);
            }
        }
        self.steps += 1;

        if self.state.stopped || self.halt_if_past_end() {
            Ok(StepOutcome::Halted)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    /// Stops the machine if `pc` is at or past the end of the program.
    fn halt_if_past_end(&mut self) -> bool {
        if self.state.pc >= self.program.len_bytes() {
            debug!("pc={} reached end of program", self.state.pc);
            self.state.stopped = true;
        }
        self.state.stopped
    }
}

/// Exclusive handle on the machine for the duration of one opcode.
struct Executor<'a> {
    state: &'a mut MachineState,
    environment: &'a Environment,
    config: &'a VmConfig,
    opcode: &'a Opcode,
    /// Byte offset of `opcode`.
    offset: usize,
    /// Index of `opcode` in the program.
    index: usize,
}

impl Executor<'_> {
    /// Validates arity, applies the opcode's transition and advances `pc`.
    fn execute(&mut self) -> Result<(), VMError> {
        let required = self.opcode.stack_inputs();
        let available = self.state.stack.len();
        if available < required {
            return Err(self.underflow(StackUnderflow {
                required,
                available,
            }));
        }

        let opcode = self.opcode;
        match opcode {
            Opcode::Stop => {
                self.state.stopped = true;
                return Ok(());
            }
            // Arithmetic
            Opcode::Add => self.binary(Word::wrapping_add)?,
            Opcode::Mul => self.binary(Word::wrapping_mul)?,
            Opcode::Sub => self.binary(Word::wrapping_sub)?,
            Opcode::Div => self.binary(|a, b| a.div_rem(b).map_or(Word::ZERO, |(q, _)| q))?,
            Opcode::Mod => self.binary(|a, b| a.div_rem(b).map_or(Word::ZERO, |(_, r)| r))?,
            // Comparison / bitwise
            Opcode::Lt => self.binary(|a, b| Word::from_bool(a < b))?,
            Opcode::Gt => self.binary(|a, b| Word::from_bool(a > b))?,
            Opcode::Eq => self.binary(|a, b| Word::from_bool(a == b))?,
            Opcode::IsZero => self.unary(|a| Word::from_bool(a.is_zero()))?,
            Opcode::And => self.binary(|a, b| a & b)?,
            Opcode::Or => self.binary(|a, b| a | b)?,
            Opcode::Xor => self.binary(|a, b| a ^ b)?,
            Opcode::Not => self.unary(|a| !a)?,
            Opcode::Shl => self.binary(|shift, value| value << shift_amount(shift))?,
            Opcode::Shr => self.binary(|shift, value| value >> shift_amount(shift))?,
            // Environment
            Opcode::CallValue => self.state.stack.push(self.environment.value),
            // Stack / memory
            Opcode::Pop => {
                self.pop::<1>()?;
            }
            Opcode::MLoad => {
                let [address] = self.pop()?;
                let value = self.memory().read_word(address)?;
                self.state.stack.push(value);
            }
            Opcode::MStore => {
                let [address, value] = self.pop()?;
                self.memory().write_word(address, value)?;
            }
            Opcode::MStore8 => {
                let [address, value] = self.pop()?;
                self.memory().write_byte(address, value.low_u8())?;
            }
            Opcode::MSize => {
                let size = Word::from(self.state.memory.len());
                self.state.stack.push(size);
            }
            // Control flow
            Opcode::Jump => {
                let [dest] = self.pop()?;
                self.state.pc = self.jump_target(dest)?;
                return Ok(());
            }
            Opcode::JumpI => {
                let [dest, cond] = self.pop()?;
                if !cond.is_zero() {
                    self.state.pc = self.jump_target(dest)?;
                    return Ok(());
                }
            }
            Opcode::Pc => self.state.stack.push(Word::from(self.offset)),
            Opcode::JumpDest => {}
            Opcode::Push { value, .. } => self.state.stack.push(*value),
            Opcode::Dup(n) => {
                let depth = (*n as usize).saturating_sub(1);
                let value = *self
                    .state
                    .stack
                    .peek(depth)
                    .map_err(|e| self.underflow(e))?;
                self.state.stack.push(value);
            }
            Opcode::Swap(n) => {
                let result = self.state.stack.swap(*n as usize);
                result.map_err(|e| self.underflow(e))?;
            }
            Opcode::Host(host) => {
                // Host instructions own their pc transition.
                return host
                    .execute(self.state, self.environment)
                    .map_err(|fault| VMError::Host {
                        mnemonic: host.mnemonic(),
                        offset: self.offset,
                        reason: fault.0,
                    });
            }
        }

        self.state.pc += opcode.width();
        Ok(())
    }

    fn pop<const N: usize>(&mut self) -> Result<[Word; N], VMError> {
        let result = self.state.stack.pop_n::<N>();
        result.map_err(|e| self.underflow(e))
    }

    fn unary(&mut self, f: impl FnOnce(Word) -> Word) -> Result<(), VMError> {
        let [a] = self.pop()?;
        self.state.stack.push(f(a));
        Ok(())
    }

    fn binary(&mut self, f: impl FnOnce(Word, Word) -> Word) -> Result<(), VMError> {
        let [a, b] = self.pop()?;
        self.state.stack.push(f(a, b));
        Ok(())
    }

    fn memory(&mut self) -> Memory<'_> {
        Memory::new(&mut self.state.memory, self.config.max_memory, self.offset)
    }

    fn jump_target(&self, dest: Word) -> Result<usize, VMError> {
        dest.to_usize().ok_or(VMError::InvalidJumpTarget {
            offset: self.offset,
            target: dest,
        })
    }

    fn underflow(&self, err: StackUnderflow) -> VMError {
        VMError::StackUnderflow {
            mnemonic: self.opcode.mnemonic(),
            offset: self.offset,
            index: self.index,
            required: err.required,
            available: err.available,
        }
    }
}

fn check_depth(depth: usize, limit: usize, offset: usize) -> Result<(), VMError> {
    if depth > limit {
        error!("stack depth {} exceeds limit {}", depth, limit);
        return Err(VMError::StackOverflow {
            offset,
            depth,
            limit,
        });
    }
    Ok(())
}

/// Clamps a shift operand; anything at or above the word width shifts everything out.
fn shift_amount(shift: Word) -> u32 {
    shift
        .to_u64()
        .map_or(WORD_BITS, |s| s.min(WORD_BITS as u64) as u32)
}
