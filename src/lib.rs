//! Stack-based bytecode virtual machine.
//!
//! Decodes raw bytecode into a [`Program`](virtual_machine::program::Program) through a
//! pluggable opcode table and executes it over 256-bit words with byte-addressed memory.

pub mod utils;
pub mod virtual_machine;
