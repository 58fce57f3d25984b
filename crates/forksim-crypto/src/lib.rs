//! # forksim-crypto
//!
//! Keccak-256, the hash behind code hashes, CREATE2 addresses and state roots.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::{keccak256, keccak256_concat, Keccak256Hasher, EMPTY_CODE_HASH};
