//! Remote source errors

use thiserror::Error;

/// Errors from a remote state source
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Connection, timeout or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Error object returned by the node
    #[error("RPC error: {code} - {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Response carried neither result nor error
    #[error("no result in response to {0}")]
    MissingResult(String),

    /// Result could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RpcError::Status(status.as_u16()),
            None => RpcError::Transport(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

impl From<hex::FromHexError> for RpcError {
    fn from(e: hex::FromHexError) -> Self {
        RpcError::Decode(e.to_string())
    }
}

/// Result type for remote source operations
pub type RpcResult<T> = Result<T, RpcError>;
