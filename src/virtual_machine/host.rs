//! Host-provided instructions.
//!
//! The built-in catalogue in [`isa`](super::isa) is closed. Instructions it does not
//! cover can be supplied by the embedding application through [`HostInstruction`]
//! and registered in an [`OpcodeTable`](super::isa::OpcodeTable) like any other opcode.

use crate::virtual_machine::stack::StackUnderflow;
use crate::virtual_machine::state::{Environment, MachineState};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a host instruction.
///
/// The VM wraps it into [`VMError::Host`](super::errors::VMError::Host) together with
/// the position of the failing opcode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostFault(pub String);

impl From<StackUnderflow> for HostFault {
    fn from(err: StackUnderflow) -> Self {
        HostFault(err.to_string())
    }
}

/// Instruction implemented outside the VM.
///
/// `execute` receives the live machine state for the duration of a single call and
/// owns the whole transition, including advancing `state.pc`. The environment is
/// shared and read-only.
pub trait HostInstruction: Send + Sync {
    /// Name used in disassembly and error messages.
    fn mnemonic(&self) -> &'static str;

    /// Encoded size in bytes, opcode byte included.
    ///
    /// The `width - 1` bytes after the opcode byte are handed to `execute` as the
    /// immediate operand.
    fn width(&self) -> usize {
        1
    }

    /// Number of stack values that must be present before `execute` runs.
    fn stack_inputs(&self) -> usize {
        0
    }

    fn execute(
        &self,
        immediate: &[u8],
        state: &mut MachineState,
        environment: &Environment,
    ) -> Result<(), HostFault>;
}

/// Shared handle to a [`HostInstruction`] plus the immediate bytes it was decoded with.
///
/// Two handles are equal if they point to the same instruction instance and carry
/// the same immediate.
#[derive(Clone)]
pub struct HostOpcode {
    instruction: Arc<dyn HostInstruction>,
    immediate: Arc<[u8]>,
}

impl HostOpcode {
    /// Creates a handle with an empty immediate.
    pub fn new<I: HostInstruction + 'static>(instruction: I) -> Self {
        Self {
            instruction: Arc::new(instruction),
            immediate: Arc::from(Vec::new()),
        }
    }

    /// Returns a handle to the same instruction carrying `immediate`.
    pub fn with_immediate(&self, immediate: &[u8]) -> Self {
        Self {
            instruction: Arc::clone(&self.instruction),
            immediate: Arc::from(immediate),
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        self.instruction.mnemonic()
    }

    /// Encoded width, never less than one byte so decoding always advances.
    pub fn width(&self) -> usize {
        self.instruction.width().max(1)
    }

    pub fn stack_inputs(&self) -> usize {
        self.instruction.stack_inputs()
    }

    pub fn immediate(&self) -> &[u8] {
        &self.immediate
    }

    /// Returns `true` if both handles point to the same instruction instance,
    /// whatever their immediates.
    pub fn same_instruction(&self, other: &HostOpcode) -> bool {
        let this = Arc::as_ptr(&self.instruction);
        let that = Arc::as_ptr(&other.instruction);
        std::ptr::addr_eq(this, that)
    }

    pub fn execute(
        &self,
        state: &mut MachineState,
        environment: &Environment,
    ) -> Result<(), HostFault> {
        self.instruction.execute(&self.immediate, state, environment)
    }
}

impl fmt::Debug for HostOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostOpcode")
            .field("mnemonic", &self.mnemonic())
            .field("immediate", &self.immediate)
            .finish()
    }
}

impl PartialEq for HostOpcode {
    fn eq(&self, other: &Self) -> bool {
        self.same_instruction(other) && self.immediate == other.immediate
    }
}

impl Eq for HostOpcode {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl HostInstruction for Nop {
        fn mnemonic(&self) -> &'static str {
            "NOP"
        }

        fn width(&self) -> usize {
            0
        }

        fn execute(
            &self,
            _: &[u8],
            state: &mut MachineState,
            _: &Environment,
        ) -> Result<(), HostFault> {
            state.pc += 1;
            Ok(())
        }
    }

    #[test]
    fn equality_is_identity() {
        let a = HostOpcode::new(Nop);
        let b = a.clone();
        let c = HostOpcode::new(Nop);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn immediate_is_part_of_equality() {
        let a = HostOpcode::new(Nop);
        let b = a.with_immediate(&[1, 2]);
        assert!(a.same_instruction(&b));
        assert_ne!(a, b);
        assert_eq!(b, a.with_immediate(&[1, 2]));
        assert_eq!(b.immediate(), &[1, 2]);
        assert!(a.immediate().is_empty());
    }

    #[test]
    fn width_is_at_least_one() {
        assert_eq!(HostOpcode::new(Nop).width(), 1);
    }

    #[test]
    fn underflow_converts_to_fault() {
        let fault: HostFault = StackUnderflow {
            required: 2,
            available: 0,
        }
        .into();
        assert_eq!(
            fault.to_string(),
            "stack underflow: 2 values required, 0 available"
        );
    }
}
