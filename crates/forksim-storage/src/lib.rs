//! # forksim-storage
//!
//! State store for the lazy-fork simulator.
//!
//! This crate provides:
//! - `StateReader` / `StateWriter` traits over accounts, storage and code
//! - `WorkingState`, a mutable copy layered over a committed snapshot
//! - `StateDb`, a registry of committed snapshots addressed by a content root
//!
//! Committing the same content always yields the same root, and any root the
//! registry knows can be reopened as an independent working copy.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod state;
mod traits;

pub use error::{StorageError, StorageResult};
pub use state::{Snapshot, StateCache, StateDb, WorkingState};
pub use traits::{Account, State, StateReader, StateWriter, EMPTY_CODE_HASH};
