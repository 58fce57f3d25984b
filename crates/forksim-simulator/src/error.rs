//! Simulation errors

use forksim_evm::{EvmError, Opcode};
use forksim_fork::ForkError;
use forksim_primitives::U256;
use forksim_rpc::RpcError;
use forksim_storage::StorageError;
use thiserror::Error;

/// Why a simulation or bundle was aborted
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Remote fetch failed
    #[error("network error: {0}")]
    Network(#[from] RpcError),

    /// The sender cannot cover the value, checked before execution
    #[error("insufficient balance: need more than {required}, have {available}")]
    InsufficientBalance {
        /// Value the simulation sends
        required: U256,
        /// Remote sender balance
        available: U256,
    },

    /// A hooked opcode ran with too few stack operands
    #[error("stack underflow before {opcode}: need {required}, have {available}")]
    StackUnderflow {
        /// Opcode about to run
        opcode: Opcode,
        /// Operands needed
        required: usize,
        /// Stack height
        available: usize,
    },

    /// The transaction reverted or halted
    #[error("execution failed: {0}")]
    Execution(EvmError),

    /// Committing bundle state failed
    #[error("commit failed: {0}")]
    Commit(StorageError),

    /// Reading or rebuilding state failed
    #[error("state error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
}

impl SimulationError {
    /// Data handed back by REVERT, if that is how execution ended
    pub fn revert_data(&self) -> Option<&[u8]> {
        match self {
            SimulationError::Execution(EvmError::Revert(data)) => Some(data),
            _ => None,
        }
    }
}

impl From<ForkError> for SimulationError {
    fn from(e: ForkError) -> Self {
        match e {
            ForkError::Network(e) => SimulationError::Network(e),
            ForkError::StackUnderflow {
                opcode,
                required,
                available,
            } => SimulationError::StackUnderflow {
                opcode,
                required,
                available,
            },
            ForkError::Execution(e) => SimulationError::Execution(e),
            ForkError::Storage(e) => SimulationError::Storage(e),
        }
    }
}

/// Result type for simulations
pub type SimResult<T> = Result<T, SimulationError>;
