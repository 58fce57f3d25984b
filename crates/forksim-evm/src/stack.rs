//! EVM stack and 256-bit word arithmetic

use crate::error::{EvmError, EvmResult};
use crate::gas::cost::MAX_STACK_SIZE;
use forksim_primitives::{Address, H256};
use primitive_types::{U256, U512};

/// One 256-bit stack word
pub type Word = U256;

/// EVM stack (max 1024 words)
#[derive(Clone, Debug)]
pub struct Stack {
    data: Vec<Word>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(32),
        }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Word) -> EvmResult<()> {
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(EvmError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Push 1 for true, 0 for false
    pub fn push_bool(&mut self, value: bool) -> EvmResult<()> {
        self.push(if value { U256::one() } else { U256::zero() })
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> EvmResult<Word> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Pop a word and read its low 20 bytes as an address
    pub fn pop_address(&mut self) -> EvmResult<Address> {
        Ok(word_to_address(&self.pop()?))
    }

    /// Peek at the top of the stack
    pub fn peek(&self) -> EvmResult<&Word> {
        self.peek_at(0)
    }

    /// Peek at a specific depth (0 = top)
    pub fn peek_at(&self, depth: usize) -> EvmResult<&Word> {
        let len = self.data.len();
        if depth >= len {
            return Err(EvmError::StackUnderflow);
        }
        Ok(&self.data[len - 1 - depth])
    }

    /// Swap top with item at depth (1 = swap with second item)
    pub fn swap(&mut self, depth: usize) -> EvmResult<()> {
        let len = self.data.len();
        if depth == 0 || depth >= len {
            return Err(EvmError::StackUnderflow);
        }
        self.data.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    /// Duplicate item at depth to top (1 = dup top)
    pub fn dup(&mut self, depth: usize) -> EvmResult<()> {
        let len = self.data.len();
        if depth == 0 || depth > len {
            return Err(EvmError::StackUnderflow);
        }
        let value = self.data[len - depth];
        self.push(value)
    }

    /// Get current stack size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// Low 20 bytes of a word
pub fn word_to_address(word: &Word) -> Address {
    let mut bytes = [0u8; 32];
    word.to_big_endian(&mut bytes);
    Address::from_word(&bytes)
}

/// Left-padded address word
pub fn address_to_word(address: &Address) -> Word {
    U256::from_big_endian(&address.to_word())
}

/// Word as a 32-byte big-endian value
pub fn word_to_h256(word: &Word) -> H256 {
    H256::from_u256(*word)
}

/// Offsets and sizes: anything that does not fit a usize is unreachable memory.
pub fn word_to_usize(word: &Word) -> Option<usize> {
    if word.bits() > 64 {
        return None;
    }
    usize::try_from(word.low_u64()).ok()
}

/// Like [`word_to_usize`] but saturating, for reads past the end of a buffer.
pub fn word_to_usize_saturated(word: &Word) -> usize {
    word_to_usize(word).unwrap_or(usize::MAX)
}

fn is_negative(v: &U256) -> bool {
    v.bit(255)
}

fn twos_complement(v: U256) -> U256 {
    (!v).overflowing_add(U256::one()).0
}

fn abs(v: U256) -> U256 {
    if is_negative(&v) {
        twos_complement(v)
    } else {
        v
    }
}

/// SDIV with EVM edge cases (x / 0 = 0, MIN / -1 = MIN)
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let quotient = abs(a) / abs(b);
    if is_negative(&a) != is_negative(&b) {
        twos_complement(quotient)
    } else {
        quotient
    }
}

/// SMOD: result takes the sign of the dividend
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let remainder = abs(a) % abs(b);
    if is_negative(&a) {
        twos_complement(remainder)
    } else {
        remainder
    }
}

/// ADDMOD without intermediate overflow
pub fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    let sum = U512::from(a) + U512::from(b);
    let rem = sum % U512::from(n);
    U256::try_from(rem).unwrap_or_default()
}

/// MULMOD without intermediate overflow
pub fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    let product = a.full_mul(b);
    let rem = product % U512::from(n);
    U256::try_from(rem).unwrap_or_default()
}

/// EXP modulo 2^256
pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// SIGNEXTEND from byte `b` (0 = lowest byte)
pub fn signextend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31) {
        return x;
    }
    let bit = b.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

/// BYTE: the i-th byte counting from the most significant end
pub fn byte(i: U256, x: U256) -> U256 {
    if i >= U256::from(32) {
        return U256::zero();
    }
    U256::from(x.byte(31 - i.low_u64() as usize))
}

/// SHL
pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        return U256::zero();
    }
    value << shift.low_u64() as usize
}

/// SHR (logical)
pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        return U256::zero();
    }
    value >> shift.low_u64() as usize
}

/// SAR (sign-preserving)
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(&value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let s = shift.low_u64() as usize;
    let shifted = value >> s;
    if negative && s > 0 {
        shifted | (U256::MAX << (256 - s))
    } else {
        shifted
    }
}

/// Signed less-than
pub fn slt(a: &U256, b: &U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed greater-than
pub fn sgt(a: &U256, b: &U256) -> bool {
    slt(b, a)
}
