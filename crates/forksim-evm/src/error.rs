//! EVM error types

use forksim_primitives::{Address, H256};
use thiserror::Error;

/// EVM execution errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Out of gas
    #[error("out of gas")]
    OutOfGas,

    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Stack overflow
    #[error("stack overflow (max 1024)")]
    StackOverflow,

    /// Invalid jump destination
    #[error("invalid jump destination: {0}")]
    InvalidJump(usize),

    /// Invalid opcode
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Invalid memory access
    #[error("invalid memory access")]
    InvalidMemoryAccess,

    /// Write in static context
    #[error("state modification in static context")]
    StaticCallViolation,

    /// Return data out of bounds
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Contract creation collision
    #[error("contract address collision")]
    CreateCollision,

    /// Max code size exceeded (EIP-170)
    #[error("max code size exceeded (limit: 24576 bytes)")]
    MaxCodeSizeExceeded,

    /// Init code size exceeded (EIP-3860)
    #[error("max init code size exceeded (limit: 49152 bytes)")]
    MaxInitCodeSizeExceeded,

    /// Deployed code starting with 0xEF (EIP-3541)
    #[error("deployed code starts with 0xef")]
    InvalidCodePrefix,

    /// Call depth exceeded
    #[error("call depth exceeded (max 1024)")]
    CallDepthExceeded,

    /// Insufficient balance for transfer
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Nonce would overflow
    #[error("nonce overflow")]
    NonceOverflow,

    /// Revert with data
    #[error("execution reverted")]
    Revert(Vec<u8>),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<forksim_storage::StorageError> for EvmError {
    fn from(err: forksim_storage::StorageError) -> Self {
        EvmError::Storage(err.to_string())
    }
}

/// Result type for EVM operations
pub type EvmResult<T> = Result<T, EvmError>;

/// Outcome of one frame
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Gas used
    pub gas_used: u64,
    /// Gas left over, returned to the caller
    pub gas_left: u64,
    /// Return data (or revert data)
    pub output: Vec<u8>,
    /// Logs emitted
    pub logs: Vec<Log>,
    /// Why the frame stopped, when it did not succeed
    pub halt: Option<EvmError>,
}

/// Log entry emitted by LOG opcodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// Contract address that emitted the log
    pub address: Address,
    /// Log topics (0-4)
    pub topics: Vec<H256>,
    /// Log data
    pub data: Vec<u8>,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(gas_used: u64, gas_left: u64, output: Vec<u8>, logs: Vec<Log>) -> Self {
        Self {
            success: true,
            gas_used,
            gas_left,
            output,
            logs,
            halt: None,
        }
    }

    /// Exceptional halt: all gas consumed, no output
    pub fn failure(gas_used: u64, reason: EvmError) -> Self {
        Self {
            success: false,
            gas_used,
            gas_left: 0,
            output: Vec::new(),
            logs: Vec::new(),
            halt: Some(reason),
        }
    }

    /// Create a revert result; unused gas goes back to the caller
    pub fn revert(gas_used: u64, gas_left: u64, output: Vec<u8>) -> Self {
        Self {
            success: false,
            gas_used,
            gas_left,
            output: output.clone(),
            logs: Vec::new(),
            halt: Some(EvmError::Revert(output)),
        }
    }

    /// Whether the frame ended in REVERT
    pub fn is_revert(&self) -> bool {
        matches!(self.halt, Some(EvmError::Revert(_)))
    }
}
