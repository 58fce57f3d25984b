//! The remote state source seam

use crate::error::RpcResult;
use forksim_primitives::{Address, H256, U256};
use std::fmt;
use std::sync::Arc;

/// Block a remote lookup is evaluated at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlockTag {
    /// Chain head
    #[default]
    Latest,
    /// Fixed block height
    Number(u64),
}

impl BlockTag {
    /// Zero or negative heights mean the chain head
    pub fn from_number(number: i64) -> Self {
        if number <= 0 {
            BlockTag::Latest
        } else {
            BlockTag::Number(number as u64)
        }
    }

    /// JSON-RPC block parameter: `"latest"` or a `0x` hex quantity
    pub fn to_wire(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Number(n) => format!("0x{:x}", n),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Read-only view of a remote chain's state
pub trait StateSource: Send + Sync {
    /// Deployed code, empty for accounts without code
    fn get_code(&self, address: &Address, block: BlockTag) -> RpcResult<Vec<u8>>;

    /// Storage slot value
    fn get_storage_at(&self, address: &Address, slot: &H256, block: BlockTag) -> RpcResult<H256>;

    /// Balance in wei
    fn get_balance(&self, address: &Address, block: BlockTag) -> RpcResult<U256>;
}

impl<T: StateSource + ?Sized> StateSource for Arc<T> {
    fn get_code(&self, address: &Address, block: BlockTag) -> RpcResult<Vec<u8>> {
        (**self).get_code(address, block)
    }

    fn get_storage_at(&self, address: &Address, slot: &H256, block: BlockTag) -> RpcResult<H256> {
        (**self).get_storage_at(address, slot, block)
    }

    fn get_balance(&self, address: &Address, block: BlockTag) -> RpcResult<U256> {
        (**self).get_balance(address, block)
    }
}

impl<T: StateSource + ?Sized> StateSource for &T {
    fn get_code(&self, address: &Address, block: BlockTag) -> RpcResult<Vec<u8>> {
        (**self).get_code(address, block)
    }

    fn get_storage_at(&self, address: &Address, slot: &H256, block: BlockTag) -> RpcResult<H256> {
        (**self).get_storage_at(address, slot, block)
    }

    fn get_balance(&self, address: &Address, block: BlockTag) -> RpcResult<U256> {
        (**self).get_balance(address, block)
    }
}
