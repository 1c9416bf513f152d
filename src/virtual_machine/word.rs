//! 256-bit unsigned machine word.
//!
//! All arithmetic wraps modulo 2^256. Limbs are stored least-significant first so
//! carries propagate upward through the array.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};

/// Number of bytes in a [`Word`].
pub const WORD_BYTES: usize = 32;

/// Number of bits in a [`Word`].
pub const WORD_BITS: u32 = 256;

const LIMBS: usize = 4;

/// Fixed-width 256-bit unsigned integer used for stack entries and immediates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word([u64; LIMBS]);

impl Word {
    pub const ZERO: Word = Word([0; LIMBS]);
    pub const ONE: Word = Word([1, 0, 0, 0]);
    pub const MAX: Word = Word([u64::MAX; LIMBS]);

    /// Creates a word from a `u64`.
    pub const fn from_u64(value: u64) -> Self {
        Word([value, 0, 0, 0])
    }

    /// Builds a word from big-endian bytes.
    ///
    /// Slices longer than [`WORD_BYTES`] keep only their low-order 32 bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        bytes
            .iter()
            .fold(Word::ZERO, |acc, &b| (acc << 8) | Word::from_u64(b as u64))
    }

    /// Returns the big-endian byte representation.
    pub fn to_be_bytes(&self) -> [u8; WORD_BYTES] {
        let mut out = [0u8; WORD_BYTES];
        for (i, chunk) in out.chunks_exact_mut(8).enumerate() {
            chunk.copy_from_slice(&self.0[LIMBS - 1 - i].to_be_bytes());
        }
        out
    }

    /// Returns `true` if every bit is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&limb| limb == 0)
    }

    /// Returns the least significant byte.
    pub const fn low_u8(&self) -> u8 {
        self.0[0] as u8
    }

    /// Returns the value as `u64` if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[1..].iter().all(|&limb| limb == 0) {
            Some(self.0[0])
        } else {
            None
        }
    }

    /// Returns the value as `usize` if it fits.
    pub fn to_usize(&self) -> Option<usize> {
        self.to_u64().and_then(|v| usize::try_from(v).ok())
    }

    /// Converts a boolean to `0` or `1`.
    pub const fn from_bool(value: bool) -> Self {
        if value { Word::ONE } else { Word::ZERO }
    }

    pub fn wrapping_add(self, rhs: Word) -> Word {
        let mut out = [0u64; LIMBS];
        let mut carry = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(rhs.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *slot = sum;
            carry = c1 || c2;
        }
        Word(out)
    }

    pub fn wrapping_sub(self, rhs: Word) -> Word {
        let mut out = [0u64; LIMBS];
        let mut borrow = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(rhs.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *slot = diff;
            borrow = b1 || b2;
        }
        Word(out)
    }

    /// Schoolbook multiplication truncated to the low 256 bits.
    pub fn wrapping_mul(self, rhs: Word) -> Word {
        let mut out = [0u64; LIMBS];
        for i in 0..LIMBS {
            let mut carry: u128 = 0;
            for j in 0..(LIMBS - i) {
                let cur = out[i + j] as u128 + (self.0[i] as u128) * (rhs.0[j] as u128) + carry;
                out[i + j] = cur as u64;
                carry = cur >> 64;
            }
        }
        Word(out)
    }

    /// Returns `(self / rhs, self % rhs)`, or `None` when `rhs` is zero.
    pub fn div_rem(self, rhs: Word) -> Option<(Word, Word)> {
        if rhs.is_zero() {
            return None;
        }
        if self < rhs {
            return Some((Word::ZERO, self));
        }
        if let (Some(a), Some(b)) = (self.to_u64(), rhs.to_u64()) {
            return Some((Word::from_u64(a / b), Word::from_u64(a % b)));
        }

        let mut quotient = Word::ZERO;
        let mut remainder = Word::ZERO;
        for bit in (0..WORD_BITS).rev() {
            // The shifted-out top bit means the true remainder is >= 2^256 > rhs.
            let overflow = remainder.bit(WORD_BITS - 1);
            remainder = remainder << 1;
            if self.bit(bit) {
                remainder.0[0] |= 1;
            }
            if overflow || remainder >= rhs {
                remainder = remainder.wrapping_sub(rhs);
                quotient.set_bit(bit);
            }
        }
        Some((quotient, remainder))
    }

    fn bit(&self, index: u32) -> bool {
        let limb = (index / 64) as usize;
        (self.0[limb] >> (index % 64)) & 1 == 1
    }

    fn set_bit(&mut self, index: u32) {
        let limb = (index / 64) as usize;
        self.0[limb] |= 1 << (index % 64);
    }

    fn div_rem_u64(self, divisor: u64) -> (Word, u64) {
        let mut out = [0u64; LIMBS];
        let mut rem: u128 = 0;
        for i in (0..LIMBS).rev() {
            let cur = (rem << 64) | self.0[i] as u128;
            out[i] = (cur / divisor as u128) as u64;
            rem = cur % divisor as u128;
        }
        (Word(out), rem as u64)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Word::from_u64(value)
    }
}

impl From<usize> for Word {
    fn from(value: usize) -> Self {
        Word::from_u64(value as u64)
    }
}

impl From<bool> for Word {
    fn from(value: bool) -> Self {
        Word::from_bool(value)
    }
}

impl Ord for Word {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for Word {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl BitAnd for Word {
    type Output = Word;

    fn bitand(self, rhs: Word) -> Word {
        Word(std::array::from_fn(|i| self.0[i] & rhs.0[i]))
    }
}

impl BitOr for Word {
    type Output = Word;

    fn bitor(self, rhs: Word) -> Word {
        Word(std::array::from_fn(|i| self.0[i] | rhs.0[i]))
    }
}

impl BitXor for Word {
    type Output = Word;

    fn bitxor(self, rhs: Word) -> Word {
        Word(std::array::from_fn(|i| self.0[i] ^ rhs.0[i]))
    }
}

impl Not for Word {
    type Output = Word;

    fn not(self) -> Word {
        Word(self.0.map(|limb| !limb))
    }
}

/// Logical left shift; shifts of 256 or more yield zero.
impl Shl<u32> for Word {
    type Output = Word;

    fn shl(self, shift: u32) -> Word {
        if shift >= WORD_BITS {
            return Word::ZERO;
        }
        let limbs = (shift / 64) as usize;
        let bits = shift % 64;
        let mut out = [0u64; LIMBS];
        for i in limbs..LIMBS {
            let src = i - limbs;
            out[i] = self.0[src] << bits;
            if bits > 0 && src > 0 {
                out[i] |= self.0[src - 1] >> (64 - bits);
            }
        }
        Word(out)
    }
}

/// Logical right shift; shifts of 256 or more yield zero.
impl Shr<u32> for Word {
    type Output = Word;

    fn shr(self, shift: u32) -> Word {
        if shift >= WORD_BITS {
            return Word::ZERO;
        }
        let limbs = (shift / 64) as usize;
        let bits = shift % 64;
        let mut out = [0u64; LIMBS];
        for (i, slot) in out.iter_mut().enumerate().take(LIMBS - limbs) {
            let src = i + limbs;
            *slot = self.0[src] >> bits;
            if bits > 0 && src + 1 < LIMBS {
                *slot |= self.0[src + 1] << (64 - bits);
            }
        }
        Word(out)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const CHUNK: u64 = 10_000_000_000_000_000_000;

        if self.is_zero() {
            return f.pad("0");
        }
        let mut chunks = Vec::new();
        let mut rest = *self;
        while !rest.is_zero() {
            let (q, r) = rest.div_rem_u64(CHUNK);
            chunks.push(r);
            rest = q;
        }
        let mut out = String::new();
        for (i, chunk) in chunks.iter().rev().enumerate() {
            if i == 0 {
                out.push_str(&chunk.to_string());
            } else {
                out.push_str(&format!("{:019}", chunk));
            }
        }
        f.pad(&out)
    }
}

impl fmt::LowerHex for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(top) = self.0.iter().rposition(|&limb| limb != 0) else {
            return f.pad("0");
        };
        let mut out = format!("{:x}", self.0[top]);
        for limb in self.0[..top].iter().rev() {
            out.push_str(&format!("{:016x}", limb));
        }
        f.pad(&out)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word(0x{:x})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_carries_across_limbs() {
        let a = Word([u64::MAX, 0, 0, 0]);
        assert_eq!(a.wrapping_add(Word::ONE), Word([0, 1, 0, 0]));
    }

    #[test]
    fn add_wraps_at_max() {
        assert_eq!(Word::MAX.wrapping_add(Word::ONE), Word::ZERO);
        assert_eq!(Word::MAX.wrapping_add(Word::from_u64(5)), Word::from_u64(4));
    }

    #[test]
    fn sub_wraps_below_zero() {
        assert_eq!(Word::ZERO.wrapping_sub(Word::ONE), Word::MAX);
        assert_eq!(
            Word::from_u64(10).wrapping_sub(Word::from_u64(3)),
            Word::from_u64(7)
        );
    }

    #[test]
    fn mul_crosses_limbs_and_truncates() {
        let two_64 = Word([0, 1, 0, 0]);
        assert_eq!(two_64.wrapping_mul(two_64), Word([0, 0, 1, 0]));
        assert_eq!(Word::MAX.wrapping_mul(Word::MAX), Word::ONE);
        assert_eq!(
            Word::from_u64(u64::MAX).wrapping_mul(Word::from_u64(2)),
            Word([u64::MAX - 1, 1, 0, 0])
        );
    }

    #[test]
    fn div_rem_small_and_wide() {
        assert_eq!(
            Word::from_u64(17).div_rem(Word::from_u64(5)),
            Some((Word::from_u64(3), Word::from_u64(2)))
        );
        assert_eq!(Word::ONE.div_rem(Word::ZERO), None);

        let wide = Word([0, 0, 0, 1]);
        let (q, r) = wide.div_rem(Word([0, 1, 0, 0])).unwrap();
        assert_eq!(q, Word([0, 0, 1, 0]));
        assert_eq!(r, Word::ZERO);

        let divisor = Word::MAX.wrapping_sub(Word::ONE);
        let (q, r) = Word::MAX.div_rem(divisor).unwrap();
        assert_eq!(q, Word::ONE);
        assert_eq!(r, Word::ONE);
    }

    #[test]
    fn shifts() {
        assert_eq!(Word::ONE << 64, Word([0, 1, 0, 0]));
        assert_eq!(Word::ONE << 255, Word([0, 0, 0, 1 << 63]));
        assert_eq!(Word::ONE << 256, Word::ZERO);
        assert_eq!(Word([0, 0, 0, 1 << 63]) >> 255, Word::ONE);
        assert_eq!(Word([0, 3, 0, 0]) >> 1, Word([1 << 63, 1, 0, 0]));
        assert_eq!(Word::MAX >> 300, Word::ZERO);
    }

    #[test]
    fn ordering_uses_high_limbs_first() {
        assert!(Word([0, 0, 0, 1]) > Word([u64::MAX, u64::MAX, u64::MAX, 0]));
        assert!(Word::from_u64(2) > Word::ONE);
    }

    #[test]
    fn be_bytes() {
        let w = Word::from_be_slice(&[0x01, 0x02]);
        assert_eq!(w, Word::from_u64(0x0102));
        let bytes = w.to_be_bytes();
        assert_eq!(&bytes[30..], &[0x01, 0x02]);
        assert!(bytes[..30].iter().all(|&b| b == 0));
        assert_eq!(Word::from_be_slice(&[0xff; 32]), Word::MAX);
    }

    #[test]
    fn display_decimal() {
        assert_eq!(Word::ZERO.to_string(), "0");
        assert_eq!(Word::from_u64(42).to_string(), "42");
        assert_eq!(Word([0, 1, 0, 0]).to_string(), "18446744073709551616");
        assert_eq!(
            Word::MAX.to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn hex_format() {
        assert_eq!(format!("{:x}", Word::from_u64(255)), "ff");
        assert_eq!(format!("{:x}", Word([0, 1, 0, 0])), "10000000000000000");
        assert_eq!(format!("{:?}", Word::ZERO), "Word(0x0)");
    }

    #[test]
    fn usize_conversion() {
        assert_eq!(Word::from_u64(7).to_usize(), Some(7));
        assert_eq!(Word([0, 1, 0, 0]).to_usize(), None);
    }
}
