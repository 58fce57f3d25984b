//! State seam used by the interpreter

use crate::error::EvmResult;
use forksim_primitives::{Address, H256, U256};

/// Everything the interpreter needs from world state within one transaction.
///
/// Mutations are journaled and undone by [`StateAccess::revert_to_snapshot`].
/// The `preload_*` methods install facts learned from outside the EVM; they
/// are never undone by a revert.
pub trait StateAccess {
    /// Whether the account exists
    fn account_exists(&self, address: &Address) -> EvmResult<bool>;

    /// Missing or EIP-161 empty
    fn is_empty(&self, address: &Address) -> EvmResult<bool>;

    /// Balance in wei
    fn get_balance(&self, address: &Address) -> EvmResult<U256>;

    /// Nonce
    fn get_nonce(&self, address: &Address) -> EvmResult<u64>;

    /// Deployed code
    fn get_code(&self, address: &Address) -> EvmResult<Vec<u8>>;

    /// Code hash; zero for a non-existent account
    fn get_code_hash(&self, address: &Address) -> EvmResult<H256>;

    /// Current storage value
    fn get_storage(&self, address: &Address, key: &H256) -> EvmResult<H256>;

    /// Storage value at the start of the transaction
    fn get_original_storage(&self, address: &Address, key: &H256) -> EvmResult<H256>;

    /// Write a storage value
    fn set_storage(&mut self, address: Address, key: H256, value: H256) -> EvmResult<()>;

    /// EIP-1153 transient storage read
    fn get_transient(&self, address: &Address, key: &H256) -> H256;

    /// EIP-1153 transient storage write
    fn set_transient(&mut self, address: Address, key: H256, value: H256);

    /// Move value between accounts, creating the recipient if needed
    fn transfer(&mut self, from: &Address, to: &Address, value: U256) -> EvmResult<()>;

    /// Bump the nonce, returning the new value
    fn increment_nonce(&mut self, address: &Address) -> EvmResult<u64>;

    /// Start a new contract account, keeping any balance already there
    fn create_account(&mut self, address: &Address) -> EvmResult<()>;

    /// Deploy code
    fn set_code(&mut self, address: &Address, code: Vec<u8>) -> EvmResult<()>;

    /// Send the balance to `beneficiary`; deletes the account only when it
    /// was created in this transaction (EIP-6780)
    fn selfdestruct(&mut self, address: &Address, beneficiary: &Address) -> EvmResult<()>;

    /// Mark an address warm, returning whether it already was
    fn warm_address(&mut self, address: &Address) -> bool;

    /// Mark a slot warm, returning whether it already was
    fn warm_storage(&mut self, address: &Address, key: &H256) -> bool;

    /// Add to the refund counter
    fn add_refund(&mut self, amount: u64);

    /// Remove from the refund counter
    fn sub_refund(&mut self, amount: u64);

    /// Accumulated refund
    fn refund(&self) -> u64;

    /// Mark a point to roll back to
    fn snapshot(&mut self) -> usize;

    /// Undo everything journaled since the snapshot
    fn revert_to_snapshot(&mut self, snapshot: usize);

    /// Install fetched code, creating the account if needed
    fn preload_code(&mut self, address: &Address, code: Vec<u8>) -> EvmResult<()>;

    /// Install a fetched storage value
    fn preload_storage(&mut self, address: &Address, key: &H256, value: H256) -> EvmResult<()>;

    /// Credit a balance top-up learned from outside the EVM
    fn preload_balance_credit(&mut self, address: &Address, amount: U256) -> EvmResult<()>;
}
