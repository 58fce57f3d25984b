//! # forksim-evm
//!
//! EVM execution engine used by the lazy-fork simulator.
//!
//! - [`Interpreter`] runs one call frame and recurses into nested calls and
//!   creations.
//! - [`StateAccess`] is the state seam; [`JournaledState`] implements it over
//!   any [`forksim_storage::State`] with EIP-2929 access sets, refunds and
//!   revertible snapshots.
//! - [`OpcodeHook`] runs before every opcode dispatch. Its error type aborts
//!   the whole execution instead of failing the current frame.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
mod error;
pub mod gas;
mod hook;
mod interpreter;
mod journal;
mod memory;
mod opcode;
pub mod stack;
mod state;

pub use context::{BlockContext, CallContext, CallKind, Environment, TxContext};
pub use error::{EvmError, EvmResult, ExecutionResult, Log};
pub use hook::{FrameView, NoHook, OpcodeHook};
pub use interpreter::{create2_address, create_address, Interpreter};
pub use journal::JournaledState;
pub use memory::Memory;
pub use opcode::Opcode;
pub use stack::{Stack, Word};
pub use state::StateAccess;
