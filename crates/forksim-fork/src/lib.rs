//! # forksim-fork
//!
//! Executes transactions against state that is fetched from a remote node
//! only when the bytecode asks for it.
//!
//! - [`ForkRecord`]: which facts were fetched, plus the access list a run built
//! - [`fetch_descriptor`]: the opcodes that trigger a fetch and where their operands sit
//! - [`LazyFork`]: the interpreter hook that fetches and installs missing facts
//! - [`execute`]: one transaction, intrinsic gas to refund
//! - [`reconstruct`]: a fresh state holding exactly what a record names

#![warn(missing_docs)]
#![warn(clippy::all)]

mod descriptor;
mod error;
mod execute;
mod hooks;
mod ideal;
mod record;

pub use descriptor::{fetch_descriptor, FetchDescriptor, FetchKind};
pub use error::{ForkError, ForkResult};
pub use execute::{execute, ExecutionOutcome, Transaction, PRECOMPILES};
pub use hooks::LazyFork;
pub use ideal::reconstruct;
pub use record::{AccessList, AccessListBuilder, AccessListItem, ForkRecord, StorageKey};
