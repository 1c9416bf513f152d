//! Mutable machine state and the read-only execution environment.

use crate::virtual_machine::stack::Stack;
use crate::virtual_machine::word::Word;

/// Execution record threaded through a run.
///
/// While `stopped` is `false`, `pc` is expected to be the byte offset of a decoded
/// opcode; the VM verifies this at every fetch. Once `stopped` is `true` nothing
/// executes again.
///
/// `Clone` rebuilds the stack and memory as new, independently growable buffers;
/// the VM relies on this to isolate caller-supplied state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MachineState {
    /// Byte offset of the next opcode.
    pub pc: usize,
    pub stack: Stack<Word>,
    /// Byte-addressed linear memory, zero-extended on access.
    pub memory: Vec<u8>,
    /// Terminal halt flag.
    pub stopped: bool,
}

impl MachineState {
    /// Creates the default initial state: `pc = 0`, empty stack and memory, running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a running state at `pc = 0` with `stack` as its initial contents.
    pub fn with_stack(stack: impl Into<Stack<Word>>) -> Self {
        Self {
            stack: stack.into(),
            ..Self::default()
        }
    }
}

/// Immutable context visible to every opcode during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    /// Value transferred with the call, read by `CALLVALUE`.
    pub value: Word,
}

impl Environment {
    pub const fn new(value: Word) -> Self {
        Self { value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state() {
        let state = MachineState::new();
        assert_eq!(state.pc, 0);
        assert!(state.stack.is_empty());
        assert!(state.memory.is_empty());
        assert!(!state.stopped);
    }

    #[test]
    fn clone_does_not_share_buffers() {
        let original = MachineState::with_stack(vec![Word::ONE]);
        let mut copy = original.clone();
        copy.stack.push(Word::from_u64(2));
        copy.memory.push(9);
        copy.pc = 4;
        copy.stopped = true;
        assert_eq!(original, MachineState::with_stack(vec![Word::ONE]));
    }

    #[test]
    fn default_environment_has_zero_value() {
        assert_eq!(Environment::default().value, Word::ZERO);
        assert_eq!(Environment::new(Word::ONE).value, Word::ONE);
    }
}
