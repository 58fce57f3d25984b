//! EVM memory implementation

use crate::error::{EvmError, EvmResult};
use crate::gas;
use crate::stack::Word;

/// Offsets past this are never affordable; reject them before doing arithmetic.
const MAX_MEMORY: usize = u32::MAX as usize;

/// EVM memory (byte-addressable, expandable)
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Get current memory size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Gas for growing memory to cover `offset..offset + size`.
    /// Zero-size ranges never expand.
    pub fn expansion_gas(&self, offset: usize, size: usize) -> EvmResult<u64> {
        if size == 0 {
            return Ok(0);
        }
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= MAX_MEMORY)
            .ok_or(EvmError::OutOfGas)?;
        Ok(gas::memory_gas(self.data.len(), end))
    }

    /// Ensure memory is at least `offset + size` bytes, word aligned.
    /// Callers charge [`Memory::expansion_gas`] first.
    pub fn expand(&mut self, offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        let new_size = offset.saturating_add(size);
        if new_size > self.data.len() {
            self.data.resize(new_size.div_ceil(32) * 32, 0);
        }
    }

    /// Load a 32-byte word from memory
    pub fn load(&self, offset: usize) -> Word {
        Word::from_big_endian(&self.load_slice(offset, 32))
    }

    /// Store a 32-byte word to memory
    pub fn store(&mut self, offset: usize, value: &Word) {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        self.store_slice(offset, &bytes);
    }

    /// Store a single byte to memory
    pub fn store8(&mut self, offset: usize, value: u8) {
        self.expand(offset, 1);
        self.data[offset] = value;
    }

    /// Load a byte slice from memory; bytes past the end read as zero
    pub fn load_slice(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut result = vec![0u8; size];
        if offset < self.data.len() {
            let end = offset.saturating_add(size).min(self.data.len());
            result[..end - offset].copy_from_slice(&self.data[offset..end]);
        }
        result
    }

    /// Store a byte slice to memory
    pub fn store_slice(&mut self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.expand(offset, data.len());
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Write `size` bytes taken from `source` at `source_offset`, zero padded.
    /// Shared by CALLDATACOPY, CODECOPY, EXTCODECOPY and RETURNDATACOPY.
    pub fn copy_from(&mut self, offset: usize, source: &[u8], source_offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        self.expand(offset, size);
        let dest = &mut self.data[offset..offset + size];
        dest.fill(0);
        if source_offset < source.len() {
            let available = (source.len() - source_offset).min(size);
            dest[..available].copy_from_slice(&source[source_offset..source_offset + available]);
        }
    }

    /// Copy within memory (for MCOPY)
    pub fn copy(&mut self, dest: usize, src: usize, size: usize) {
        if size == 0 {
            return;
        }
        self.expand(dest.max(src), size);
        self.data.copy_within(src..src + size, dest);
    }

    /// Get raw data slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
