//! # forksim-rpc
//!
//! Where forked state comes from.
//!
//! - [`StateSource`]: code, storage and balance lookups at a [`BlockTag`]
//! - [`HttpStateSource`]: blocking JSON-RPC 2.0 client over HTTP
//! - [`MockStateSource`]: in-memory source with call counters, for tests
//!
//! Every lookup is a synchronous call. Failures are returned as they come;
//! nothing here retries.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
mod error;
mod mock;
mod source;
pub mod types;

pub use client::{HttpStateSource, RpcConfig};
pub use error::{RpcError, RpcResult};
pub use mock::{MockStateSource, SourceCall};
pub use source::{BlockTag, StateSource};
