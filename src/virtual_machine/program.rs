//! Decoded program representation and the bytecode decoder.
//!
//! [`decode`] turns raw bytes into a [`Program`]: the opcodes in execution order plus
//! a source map from byte offset to opcode index. The source map is the only link
//! between a runtime `pc` and an instruction.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Opcode, OpcodeTable};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Decoded, immutable program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    opcodes: Vec<Opcode>,
    /// Byte offset -> index into `opcodes`.
    source_map: BTreeMap<usize, usize>,
    /// Total encoded size in bytes.
    len_bytes: usize,
}

impl Program {
    /// Builds a program from opcodes and an explicit source map.
    ///
    /// The byte length is the end of the furthest mapped opcode. Entries pointing
    /// past `opcodes` are kept and surface as `InvalidPC` when reached.
    pub fn new(opcodes: Vec<Opcode>, source_map: BTreeMap<usize, usize>) -> Self {
        let len_bytes = source_map
            .iter()
            .filter_map(|(&offset, &index)| opcodes.get(index).map(|op| offset + op.width()))
            .max()
            .unwrap_or(0);
        Self {
            opcodes,
            source_map,
            len_bytes,
        }
    }

    /// Builds a program laying `opcodes` out back to back from offset 0.
    pub fn from_opcodes(opcodes: Vec<Opcode>) -> Self {
        let mut source_map = BTreeMap::new();
        let mut offset = 0;
        for (index, opcode) in opcodes.iter().enumerate() {
            source_map.insert(offset, index);
            offset += opcode.width();
        }
        Self {
            opcodes,
            source_map,
            len_bytes: offset,
        }
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn source_map(&self) -> &BTreeMap<usize, usize> {
        &self.source_map
    }

    /// Total encoded size in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Number of opcodes.
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    /// Resolves a byte offset to the opcode index that begins there.
    pub fn index_at(&self, offset: usize) -> Option<usize> {
        self.source_map.get(&offset).copied()
    }

    /// Resolves a byte offset to the opcode that begins there.
    pub fn opcode_at(&self, offset: usize) -> Option<&Opcode> {
        let index = self.index_at(offset)?;
        self.opcodes.get(index)
    }

    /// Returns the byte offset of the opcode at `index`.
    pub fn offset_of(&self, index: usize) -> Option<usize> {
        self.source_map
            .iter()
            .find(|&(_, &i)| i == index)
            .map(|(&offset, _)| offset)
    }

    /// Re-encodes the program using the byte assignment of `table`.
    pub fn to_bytecode(&self, table: &OpcodeTable) -> Result<Vec<u8>, VMError> {
        let mut out = Vec::with_capacity(self.len_bytes);
        for index in self.source_map.values() {
            let Some(opcode) = self.opcodes.get(*index) else {
                continue;
            };
            let Some(byte) = table.byte_for(opcode) else {
                return Err(VMError::UnencodableOpcode {
                    mnemonic: opcode.mnemonic(),
                });
            };
            out.push(byte);
            match opcode {
                Opcode::Push { width, value } => {
                    let width = *width as usize;
                    let bytes = value.to_be_bytes();
                    if width > bytes.len() {
                        out.resize(out.len() + width - bytes.len(), 0);
                        out.extend_from_slice(&bytes);
                    } else {
                        out.extend_from_slice(&bytes[bytes.len() - width..]);
                    }
                }
                Opcode::Host(host) => {
                    let immediate = host.immediate();
                    let width = host.width() - 1;
                    out.extend_from_slice(&immediate[..immediate.len().min(width)]);
                    out.resize(out.len() + width.saturating_sub(immediate.len()), 0);
                }
                other => out.resize(out.len() + other.width() - 1, 0),
            }
        }
        Ok(out)
    }

    /// Renders one `offset: OPCODE` line per opcode in offset order.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (offset, index) in &self.source_map {
            match self.opcodes.get(*index) {
                Some(opcode) => {
                    let _ = writeln!(out, "{offset:04}: {opcode}");
                }
                None => {
                    let _ = writeln!(out, "{offset:04}: <missing #{index}>");
                }
            }
        }
        out
    }
}

/// Decodes `bytes` into a [`Program`] using `table`.
///
/// Pure and deterministic: equal inputs always produce equal programs.
pub fn decode(bytes: &[u8], table: &OpcodeTable) -> Result<Program, VMError> {
    let mut opcodes = Vec::new();
    let mut source_map = BTreeMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let byte = bytes[offset];
        let spec = table.get(byte).ok_or(VMError::UnknownOpcode {
            opcode: byte,
            offset,
        })?;
        let width = spec.width();
        let end = offset
            .checked_add(width)
            .filter(|&end| end <= bytes.len())
            .ok_or(VMError::TruncatedImmediate {
                offset,
                width: width - 1,
                available: bytes.len() - offset - 1,
            })?;

        source_map.insert(offset, opcodes.len());
        opcodes.push(spec.build(&bytes[offset + 1..end]));
        offset = end;
    }

    Ok(Program {
        opcodes,
        source_map,
        len_bytes: offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::OpcodeSpec;
    use crate::virtual_machine::word::Word;

    fn push1(v: u64) -> Opcode {
        Opcode::Push {
            width: 1,
            value: Word::from_u64(v),
        }
    }

    #[test]
    fn decode_push_push_add() {
        let program = decode(&[0x60, 0x01, 0x60, 0x02, 0x01], &OpcodeTable::standard()).unwrap();
        assert_eq!(program.opcodes(), &[push1(1), push1(2), Opcode::Add]);
        assert_eq!(
            program.source_map(),
            &BTreeMap::from([(0, 0), (2, 1), (4, 2)])
        );
        assert_eq!(program.len_bytes(), 5);
    }

    #[test]
    fn decode_is_deterministic() {
        let bytes = [0x61, 0xab, 0xcd, 0x80, 0x02, 0x00];
        let table = OpcodeTable::standard();
        assert_eq!(decode(&bytes, &table), decode(&bytes, &table));
    }

    #[test]
    fn decode_wide_push_is_big_endian() {
        let mut bytes = vec![0x7f];
        bytes.extend([0xff; 32]);
        let program = decode(&bytes, &OpcodeTable::standard()).unwrap();
        assert_eq!(
            program.opcodes(),
            &[Opcode::Push {
                width: 32,
                value: Word::MAX,
            }]
        );
        assert_eq!(program.len_bytes(), 33);
    }

    #[test]
    fn decode_unknown_opcode_reports_offset() {
        let err = decode(&[0x60, 0x01, 0xfe], &OpcodeTable::standard()).unwrap_err();
        assert_eq!(
            err,
            VMError::UnknownOpcode {
                opcode: 0xfe,
                offset: 2,
            }
        );
    }

    #[test]
    fn decode_truncated_immediate() {
        let err = decode(&[0x01, 0x62, 0xaa], &OpcodeTable::standard()).unwrap_err();
        assert_eq!(
            err,
            VMError::TruncatedImmediate {
                offset: 1,
                width: 3,
                available: 1,
            }
        );
    }

    #[test]
    fn decode_empty_input() {
        let program = decode(&[], &OpcodeTable::standard()).unwrap();
        assert!(program.is_empty());
        assert_eq!(program.len_bytes(), 0);
    }

    #[test]
    fn decode_respects_table() {
        let mut table = OpcodeTable::empty();
        table.register(0xaa, OpcodeSpec::Fixed(Opcode::Add));
        table.register(0x01, OpcodeSpec::Push { width: 2 });

        let program = decode(&[0x01, 0x00, 0x07, 0xaa], &table).unwrap();
        assert_eq!(
            program.opcodes(),
            &[
                Opcode::Push {
                    width: 2,
                    value: Word::from_u64(7),
                },
                Opcode::Add
            ]
        );
        assert!(decode(&[0x01], &OpcodeTable::standard()).is_ok());
        assert!(decode(&[0x60, 0x01], &table).is_err());
    }

    #[test]
    fn from_opcodes_builds_source_map() {
        let program = Program::from_opcodes(vec![push1(1), push1(2), Opcode::Add]);
        assert_eq!(
            program,
            Program::new(
                vec![push1(1), push1(2), Opcode::Add],
                BTreeMap::from([(0, 0), (2, 1), (4, 2)])
            )
        );
        assert_eq!(program.offset_of(2), Some(4));
        assert_eq!(program.opcode_at(2), Some(&push1(2)));
        assert_eq!(program.opcode_at(1), None);
    }

    #[test]
    fn source_map_matches_opcode_offsets() {
        let bytes = [0x60, 0x05, 0x80, 0x61, 0x01, 0x00, 0x01, 0x00];
        let table = OpcodeTable::standard();
        let program = decode(&bytes, &table).unwrap();
        for (&offset, &index) in program.source_map() {
            let opcode = &program.opcodes()[index];
            let spec = table.get(bytes[offset]).unwrap();
            let reparsed = spec.build(&bytes[offset + 1..offset + opcode.width()]);
            assert_eq!(&reparsed, opcode);
        }
    }

    #[test]
    fn to_bytecode_round_trips() {
        let bytes = vec![0x60, 0x05, 0x80, 0x61, 0x01, 0x00, 0x01, 0x00];
        let table = OpcodeTable::standard();
        let program = decode(&bytes, &table).unwrap();
        assert_eq!(program.to_bytecode(&table).unwrap(), bytes);
    }

    #[test]
    fn to_bytecode_unencodable() {
        let program = Program::from_opcodes(vec![Opcode::Add]);
        assert_eq!(
            program.to_bytecode(&OpcodeTable::empty()),
            Err(VMError::UnencodableOpcode { mnemonic: "ADD" })
        );
    }

    #[test]
    fn disassemble_lists_offsets() {
        let program = decode(&[0x60, 0x01, 0x60, 0x02, 0x01], &OpcodeTable::standard()).unwrap();
        assert_eq!(
            program.disassemble(),
            "0000: PUSH1 0x1\n0002: PUSH1 0x2\n0004: ADD\n"
        );
    }
}
