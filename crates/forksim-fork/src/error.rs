//! Fork execution errors

use forksim_evm::{EvmError, Opcode};
use forksim_rpc::RpcError;
use forksim_storage::StorageError;
use thiserror::Error;

/// Errors from a lazy-fork run
#[derive(Debug, Error)]
pub enum ForkError {
    /// Remote lookup failed
    #[error("network error: {0}")]
    Network(#[from] RpcError),

    /// A hooked opcode lacks the operands its fetch needs
    #[error("stack underflow before {opcode}: need {required}, have {available}")]
    StackUnderflow {
        /// Opcode about to run
        opcode: Opcode,
        /// Operands the fetch reads
        required: usize,
        /// Stack height
        available: usize,
    },

    /// The transaction did not complete
    #[error("execution failed: {0}")]
    Execution(EvmError),

    /// State store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<EvmError> for ForkError {
    fn from(e: EvmError) -> Self {
        ForkError::Execution(e)
    }
}

/// Result type for fork operations
pub type ForkResult<T> = Result<T, ForkError>;
