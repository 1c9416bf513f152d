use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::word::{WORD_BYTES, Word};

/// Bounds-checked view over the machine's byte memory for one opcode.
///
/// Accesses zero-extend the underlying buffer to cover the touched range.
pub(super) struct Memory<'a> {
    bytes: &'a mut Vec<u8>,
    limit: usize,
    /// Offset of the executing opcode, for error reporting.
    offset: usize,
}

impl<'a> Memory<'a> {
    pub(super) fn new(bytes: &'a mut Vec<u8>, limit: usize, offset: usize) -> Self {
        Self {
            bytes,
            limit,
            offset,
        }
    }

    /// Grows memory to cover `[address, address + size)` and returns the range start.
    fn expand(&mut self, address: Word, size: usize) -> Result<usize, VMError> {
        let exceeded = VMError::MemoryLimitExceeded {
            offset: self.offset,
            address,
            size,
            limit: self.limit,
        };
        let start = address.to_usize().ok_or_else(|| exceeded.clone())?;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.limit)
            .ok_or(exceeded)?;
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        Ok(start)
    }

    pub(super) fn read_word(&mut self, address: Word) -> Result<Word, VMError> {
        let start = self.expand(address, WORD_BYTES)?;
        Ok(Word::from_be_slice(&self.bytes[start..start + WORD_BYTES]))
    }

    pub(super) fn write_word(&mut self, address: Word, value: Word) -> Result<(), VMError> {
        let start = self.expand(address, WORD_BYTES)?;
        self.bytes[start..start + WORD_BYTES].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub(super) fn write_byte(&mut self, address: Word, value: u8) -> Result<(), VMError> {
        let start = self.expand(address, 1)?;
        self.bytes[start] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_word_expands_and_reads_back() {
        let mut bytes = Vec::new();
        let mut memory = Memory::new(&mut bytes, 1024, 0);
        memory
            .write_word(Word::from_u64(4), Word::from_u64(0xabcd))
            .unwrap();
        assert_eq!(
            memory.read_word(Word::from_u64(4)).unwrap(),
            Word::from_u64(0xabcd)
        );
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[34..], &[0xab, 0xcd]);
    }

    #[test]
    fn read_zero_extends() {
        let mut bytes = vec![1];
        let mut memory = Memory::new(&mut bytes, 1024, 0);
        assert_eq!(memory.read_word(Word::from_u64(1)).unwrap(), Word::ZERO);
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 1);
    }

    #[test]
    fn limit_is_enforced() {
        let mut bytes = Vec::new();
        let mut memory = Memory::new(&mut bytes, 32, 7);
        assert!(memory.write_word(Word::ZERO, Word::ONE).is_ok());
        assert_eq!(
            memory.write_byte(Word::from_u64(32), 1),
            Err(VMError::MemoryLimitExceeded {
                offset: 7,
                address: Word::from_u64(32),
                size: 1,
                limit: 32,
            })
        );
        assert!(memory.read_word(Word::MAX).is_err());
    }
}
