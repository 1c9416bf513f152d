use crate::virtual_machine::word::Word;
use thiserror::Error;

/// Errors that can occur while decoding or executing a program.
///
/// Every variant carries enough position information (byte offset, opcode index)
/// to be mapped back through the program's source map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// Byte with no entry in the opcode table.
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    /// Immediate operand runs past the end of the bytecode.
    #[error(
        "truncated immediate at offset {offset}: expected {width} bytes, {available} available"
    )]
    TruncatedImmediate {
        offset: usize,
        width: usize,
        available: usize,
    },
    /// Opcode popped more values than the stack holds.
    #[error(
        "stack underflow in {mnemonic} at offset {offset} (opcode #{index}): {required} required, {available} available"
    )]
    StackUnderflow {
        mnemonic: &'static str,
        offset: usize,
        index: usize,
        required: usize,
        available: usize,
    },
    /// Stack depth exceeded the configured limit.
    #[error("stack overflow at offset {offset}: depth {depth} exceeds limit {limit}")]
    StackOverflow {
        offset: usize,
        depth: usize,
        limit: usize,
    },
    /// Program counter does not start a decoded opcode.
    #[error("invalid program counter {pc}: not an opcode boundary")]
    InvalidPC { pc: usize },
    /// Jump destination cannot be represented as a byte offset.
    #[error("invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget { offset: usize, target: Word },
    /// Memory access outside the configured limit.
    #[error(
        "memory access of {size} bytes at address {address} (offset {offset}) exceeds limit {limit}"
    )]
    MemoryLimitExceeded {
        offset: usize,
        address: Word,
        size: usize,
        limit: usize,
    },
    /// Execution did not halt within the step budget.
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },
    /// Opcode has no byte assignment in the target table.
    #[error("opcode {mnemonic} has no encoding in the opcode table")]
    UnencodableOpcode { mnemonic: &'static str },
    /// Host-provided instruction failed.
    #[error("host instruction {mnemonic} failed at offset {offset}: {reason}")]
    Host {
        mnemonic: &'static str,
        offset: usize,
        reason: String,
    },
}

impl VMError {
    /// Returns the bytecode offset this error refers to, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            VMError::UnknownOpcode { offset, .. }
            | VMError::TruncatedImmediate { offset, .. }
            | VMError::StackUnderflow { offset, .. }
            | VMError::StackOverflow { offset, .. }
            | VMError::InvalidJumpTarget { offset, .. }
            | VMError::MemoryLimitExceeded { offset, .. }
            | VMError::Host { offset, .. } => Some(*offset),
            VMError::InvalidPC { pc } => Some(*pc),
            VMError::StepLimitExceeded { .. } | VMError::UnencodableOpcode { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_position() {
        let err = VMError::UnknownOpcode {
            opcode: 0xfe,
            offset: 3,
        };
        assert_eq!(err.to_string(), "unknown opcode 0xfe at offset 3");

        let err = VMError::StackUnderflow {
            mnemonic: "ADD",
            offset: 4,
            index: 2,
            required: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "stack underflow in ADD at offset 4 (opcode #2): 2 required, 1 available"
        );
    }

    #[test]
    fn offset_accessor() {
        assert_eq!(VMError::InvalidPC { pc: 9 }.offset(), Some(9));
        assert_eq!(VMError::StepLimitExceeded { limit: 1 }.offset(), None);
    }
}
