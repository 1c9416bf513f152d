//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical list of
//! operand-free opcodes and invokes a callback macro for code generation, so the
//! opcode enum, its metadata and the standard opcode table never drift apart.
//!
//! This module generates:
//! - The [`Opcode`] enum (operand-free variants plus `Push`, `Dup`, `Swap`, `Host`)
//! - Mnemonic and stack-arity lookups
//! - [`OpcodeTable::standard`], the default byte assignment
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - `PUSHn` immediate: `n` bytes, big-endian, directly after the opcode byte
//! - Host instructions: `width()` bytes in total, opcode byte included
//!
//! Binary operators take `a` as the first value popped (the top) and `b` as the second.

use crate::virtual_machine::host::HostOpcode;
use crate::virtual_machine::word::Word;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Byte of `PUSH1`; `PUSHn` is `PUSH_BASE + n - 1`.
pub const PUSH_BASE: u8 = 0x60;
/// Byte of `DUP1`.
pub const DUP_BASE: u8 = 0x80;
/// Byte of `SWAP1`.
pub const SWAP_BASE: u8 = 0x90;
/// Widest push immediate in the standard table.
pub const MAX_PUSH_WIDTH: u8 = 32;
/// Deepest `DUPn` / `SWAPn` in the standard table.
pub const MAX_STACK_REACH: u8 = 16;

/// Invokes a callback macro with the complete operand-free opcode list.
///
/// Entry format: `Variant = byte, "MNEMONIC", stack_inputs, stack_outputs`.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// STOP ; halts execution
            Stop = 0x00, "STOP", 0, 0,
            // =========================
            // Arithmetic (mod 2^256)
            // =========================
            /// ADD ; push a + b
            Add = 0x01, "ADD", 2, 1,
            /// MUL ; push a * b
            Mul = 0x02, "MUL", 2, 1,
            /// SUB ; push a - b
            Sub = 0x03, "SUB", 2, 1,
            /// DIV ; push a / b, or 0 when b is 0
            Div = 0x04, "DIV", 2, 1,
            /// MOD ; push a % b, or 0 when b is 0
            Mod = 0x06, "MOD", 2, 1,
            // =========================
            // Comparison / bitwise
            // =========================
            /// LT ; push 1 if a < b else 0
            Lt = 0x10, "LT", 2, 1,
            /// GT ; push 1 if a > b else 0
            Gt = 0x11, "GT", 2, 1,
            /// EQ ; push 1 if a == b else 0
            Eq = 0x14, "EQ", 2, 1,
            /// ISZERO ; push 1 if a == 0 else 0
            IsZero = 0x15, "ISZERO", 1, 1,
            /// AND ; push a & b
            And = 0x16, "AND", 2, 1,
            /// OR ; push a | b
            Or = 0x17, "OR", 2, 1,
            /// XOR ; push a ^ b
            Xor = 0x18, "XOR", 2, 1,
            /// NOT ; push !a
            Not = 0x19, "NOT", 1, 1,
            /// SHL ; push b << a
            Shl = 0x1b, "SHL", 2, 1,
            /// SHR ; push b >> a
            Shr = 0x1c, "SHR", 2, 1,
            // =========================
            // Environment
            // =========================
            /// CALLVALUE ; push the transferred value
            CallValue = 0x34, "CALLVALUE", 0, 1,
            // =========================
            // Stack / memory
            // =========================
            /// POP ; discard a
            Pop = 0x50, "POP", 1, 0,
            /// MLOAD ; push the 32-byte word at memory[a..a+32]
            MLoad = 0x51, "MLOAD", 1, 1,
            /// MSTORE ; memory[a..a+32] = b
            MStore = 0x52, "MSTORE", 2, 0,
            /// MSTORE8 ; memory[a] = b & 0xff
            MStore8 = 0x53, "MSTORE8", 2, 0,
            // =========================
            // Control flow
            // =========================
            /// JUMP ; pc = a
            Jump = 0x56, "JUMP", 1, 0,
            /// JUMPI ; pc = a if b != 0
            JumpI = 0x57, "JUMPI", 2, 0,
            /// PC ; push the offset of this opcode
            Pc = 0x58, "PC", 0, 1,
            /// MSIZE ; push the memory size in bytes
            MSize = 0x59, "MSIZE", 0, 1,
            /// JUMPDEST ; no-op jump marker
            JumpDest = 0x5b, "JUMPDEST", 0, 0,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:expr, $mnemonic:literal, $inputs:expr, $outputs:expr
        ),* $(,)?
    ) => {
        /// One decoded VM instruction.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name,
            )*
            /// PUSHn imm ; push an n-byte big-endian immediate
            Push { width: u8, value: Word },
            /// DUPn ; push a copy of the n-th value (1 = top)
            Dup(u8),
            /// SWAPn ; swap the top with the value n slots below it
            Swap(u8),
            /// Caller-supplied instruction.
            Host(HostOpcode),
        }

        impl Opcode {
            /// Returns the assembly mnemonic, without any size suffix.
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                    Opcode::Push { .. } => "PUSH",
                    Opcode::Dup(_) => "DUP",
                    Opcode::Swap(_) => "SWAP",
                    Opcode::Host(host) => host.mnemonic(),
                }
            }

            /// Returns how many stack values must be present before execution.
            pub fn stack_inputs(&self) -> usize {
                match self {
                    $( Opcode::$name => $inputs, )*
                    Opcode::Push { .. } => 0,
                    Opcode::Dup(n) => *n as usize,
                    Opcode::Swap(n) => *n as usize + 1,
                    Opcode::Host(host) => host.stack_inputs(),
                }
            }

            /// Returns how many values execution leaves in place of the inputs, or
            /// `None` for host instructions, whose effect is not declared.
            pub fn stack_outputs(&self) -> Option<usize> {
                match self {
                    $( Opcode::$name => Some($outputs), )*
                    Opcode::Push { .. } => Some(1),
                    Opcode::Dup(n) => Some(*n as usize + 1),
                    Opcode::Swap(n) => Some(*n as usize + 1),
                    Opcode::Host(_) => None,
                }
            }
        }

        impl OpcodeTable {
            /// Returns the standard instruction set.
            pub fn standard() -> Self {
                let mut table = Self::empty();
                $( table.register($byte, OpcodeSpec::Fixed(Opcode::$name)); )*
                for width in 1..=MAX_PUSH_WIDTH {
                    table.register(PUSH_BASE + width - 1, OpcodeSpec::Push { width });
                }
                for n in 1..=MAX_STACK_REACH {
                    table.register(DUP_BASE + n - 1, OpcodeSpec::Fixed(Opcode::Dup(n)));
                    table.register(SWAP_BASE + n - 1, OpcodeSpec::Fixed(Opcode::Swap(n)));
                }
                table
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    /// Returns the encoded size in bytes, opcode byte and immediates included.
    pub fn width(&self) -> usize {
        match self {
            Opcode::Push { width, .. } => 1 + *width as usize,
            Opcode::Host(host) => host.width(),
            _ => 1,
        }
    }

    /// Shorthand for a push whose width is the minimal big-endian size of `value`.
    pub fn push(value: Word) -> Self {
        let bytes = value.to_be_bytes();
        let leading = bytes.iter().take_while(|&&b| b == 0).count();
        let width = (bytes.len() - leading).max(1) as u8;
        Opcode::Push { width, value }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Push { width, value } => write!(f, "PUSH{} 0x{:x}", width, value),
            Opcode::Dup(n) => write!(f, "DUP{}", n),
            Opcode::Swap(n) => write!(f, "SWAP{}", n),
            Opcode::Host(host) if !host.immediate().is_empty() => {
                write!(f, "{} 0x", host.mnemonic())?;
                for byte in host.immediate() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            other => f.write_str(other.mnemonic()),
        }
    }
}

/// Constructor registered for one byte value in an [`OpcodeTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpcodeSpec {
    /// The byte always decodes to this opcode.
    Fixed(Opcode),
    /// The byte is followed by a `width`-byte immediate that becomes a push value.
    Push { width: u8 },
}

impl OpcodeSpec {
    /// Total encoded width of the opcode this spec builds.
    pub fn width(&self) -> usize {
        match self {
            OpcodeSpec::Fixed(opcode) => opcode.width(),
            OpcodeSpec::Push { width } => 1 + *width as usize,
        }
    }

    /// Builds the opcode from the bytes following the opcode byte.
    pub fn build(&self, immediate: &[u8]) -> Opcode {
        match self {
            OpcodeSpec::Fixed(Opcode::Host(host)) => Opcode::Host(host.with_immediate(immediate)),
            OpcodeSpec::Fixed(opcode) => opcode.clone(),
            OpcodeSpec::Push { width } => Opcode::Push {
                width: *width,
                value: Word::from_be_slice(immediate),
            },
        }
    }

    /// Returns `true` if `opcode` is encoded by this spec.
    pub fn encodes(&self, opcode: &Opcode) -> bool {
        match self {
            OpcodeSpec::Fixed(Opcode::Host(host)) => {
                matches!(opcode, Opcode::Host(other) if host.same_instruction(other))
            }
            OpcodeSpec::Fixed(fixed) => fixed == opcode,
            OpcodeSpec::Push { width } => {
                matches!(opcode, Opcode::Push { width: w, .. } if w == width)
            }
        }
    }

    fn label(&self) -> String {
        match self {
            OpcodeSpec::Fixed(opcode) => opcode.to_string(),
            OpcodeSpec::Push { width } => format!("PUSH{}", width),
        }
    }
}

/// Byte value to opcode constructor mapping consumed by the decoder.
///
/// Tables are plain values: several instruction sets can coexist, and decoding a
/// program always names the table it uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeSpec>>,
}

impl OpcodeTable {
    /// Creates a table with no byte assigned.
    pub fn empty() -> Self {
        Self {
            entries: vec![None; 256],
        }
    }

    /// Assigns `spec` to `byte`, returning the previous assignment.
    pub fn register(&mut self, byte: u8, spec: OpcodeSpec) -> Option<OpcodeSpec> {
        self.entries[byte as usize].replace(spec)
    }

    /// Removes the assignment of `byte`.
    pub fn unregister(&mut self, byte: u8) -> Option<OpcodeSpec> {
        self.entries[byte as usize].take()
    }

    pub fn get(&self, byte: u8) -> Option<&OpcodeSpec> {
        self.entries[byte as usize].as_ref()
    }

    /// Number of assigned bytes.
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates assigned bytes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &OpcodeSpec)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(byte, spec)| spec.as_ref().map(|spec| (byte as u8, spec)))
    }

    /// Returns the lowest byte whose spec encodes `opcode`.
    pub fn byte_for(&self, opcode: &Opcode) -> Option<u8> {
        self.iter()
            .find(|(_, spec)| spec.encodes(opcode))
            .map(|(byte, _)| byte)
    }

    /// SHA3-256 digest of the byte assignment.
    ///
    /// Identifies an instruction-set version: two tables with equal fingerprints
    /// decode every byte sequence the same way (host instructions are identified by
    /// mnemonic and width only).
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        for (byte, spec) in self.iter() {
            hasher.update([byte]);
            hasher.update(spec.label().as_bytes());
            hasher.update((spec.width() as u64).to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::standard()
    }
}
