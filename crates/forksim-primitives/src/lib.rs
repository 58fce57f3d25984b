//! # forksim-primitives
//!
//! Value types shared by every forksim crate: account addresses, 32-byte
//! words and the 256-bit integer used for balances and call values.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::{Address, AddressError};
pub use error::PrimitiveError;
pub use hash::{HashError, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Block number type
pub type BlockNumber = u64;

/// Gas type
pub type Gas = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_basic() {
        let a = U256::from(100u64);
        let b = U256::from(200u64);
        assert_eq!(a + b, U256::from(300u64));
    }

    #[test]
    fn test_primitive_error_from() {
        let err: PrimitiveError = Address::from_hex("0x12").unwrap_err().into();
        assert!(err.to_string().starts_with("address error"));
        let err: PrimitiveError = H256::from_hex("0x12").unwrap_err().into();
        assert!(err.to_string().starts_with("hash error"));
    }
}
