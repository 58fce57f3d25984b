//! Storage error types

use forksim_primitives::{Address, H256};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No committed snapshot is registered under this root
    #[error("unknown state root: {0}")]
    UnknownRoot(H256),

    /// An account references code that was never stored
    #[error("account {address} references missing code {code_hash}")]
    MissingCode {
        /// Account holding the dangling code hash
        address: Address,
        /// Code hash with no stored code
        code_hash: H256,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
