//! Stack-based bytecode virtual machine.
//!
//! Bytecode is decoded once into a [`program::Program`] and then executed by a [`vm::VM`]
//! that owns a private copy of its [`state::MachineState`].
//!
//! # Architecture
//!
//! - **Words**: 256-bit unsigned integers with wrapping arithmetic ([`word::Word`])
//! - **Stack**: unbounded LIFO of words, top-first pops
//! - **Memory**: byte-addressed, zero-extended on access, capped by [`vm::VmConfig`]
//! - **Decoding**: driven by an explicit [`isa::OpcodeTable`], so several instruction
//!   sets can coexist in one process
//! - **Extension**: host-defined opcodes plug in through [`host::HostInstruction`]
//!
//! # Modules
//!
//! - [`errors`]: Decode and execution error types
//! - [`host`]: Host-defined instruction trait
//! - [`isa`]: Opcode definitions and opcode tables
//! - [`program`]: Decoded programs, source maps and the bytecode decoder
//! - [`stack`]: Generic operand stack
//! - [`state`]: Machine state and execution environment
//! - [`vm`]: Execution loop and configuration
//! - [`word`]: 256-bit machine word

pub mod errors;
pub mod host;
pub mod isa;
pub mod program;
pub mod stack;
pub mod state;
pub mod vm;
pub mod word;

pub use errors::VMError;
pub use isa::{Opcode, OpcodeTable};
pub use program::{Program, decode};
pub use state::{Environment, MachineState};
pub use vm::VM;
pub use word::Word;
