//! In-memory state source for tests

use crate::error::{RpcError, RpcResult};
use crate::source::{BlockTag, StateSource};
use forksim_primitives::{Address, H256, U256};
use parking_lot::Mutex;
use std::collections::HashMap;

/// One lookup seen by a [`MockStateSource`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceCall {
    /// `get_code`
    Code(Address, BlockTag),
    /// `get_storage_at`
    Storage(Address, H256, BlockTag),
    /// `get_balance`
    Balance(Address, BlockTag),
}

#[derive(Default)]
struct MockState {
    code: HashMap<Address, Vec<u8>>,
    storage: HashMap<(Address, H256), H256>,
    balances: HashMap<Address, U256>,
    calls: Vec<SourceCall>,
    failure: Option<RpcError>,
}

/// [`StateSource`] answering from maps, recording every call.
///
/// Unknown facts read as empty code, zero storage and zero balance.
#[derive(Default)]
pub struct MockStateSource {
    state: Mutex<MockState>,
}

impl MockStateSource {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::set_code`]
    pub fn with_code(self, address: Address, code: Vec<u8>) -> Self {
        self.set_code(address, code);
        self
    }

    /// Builder form of [`Self::set_storage`]
    pub fn with_storage(self, address: Address, slot: H256, value: H256) -> Self {
        self.set_storage(address, slot, value);
        self
    }

    /// Builder form of [`Self::set_balance`]
    pub fn with_balance(self, address: Address, balance: U256) -> Self {
        self.set_balance(address, balance);
        self
    }

    /// Serve `code` for `address`
    pub fn set_code(&self, address: Address, code: Vec<u8>) {
        self.state.lock().code.insert(address, code);
    }

    /// Serve `value` for a slot
    pub fn set_storage(&self, address: Address, slot: H256, value: H256) {
        self.state.lock().storage.insert((address, slot), value);
    }

    /// Serve `balance` for `address`
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    /// Fail every later lookup with `error`
    pub fn fail_with(&self, error: RpcError) {
        self.state.lock().failure = Some(error);
    }

    /// Stop failing
    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }

    /// Every lookup so far, in order
    pub fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().calls.clone()
    }

    /// Number of `get_code` lookups
    pub fn code_calls(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Code(..)))
    }

    /// Number of `get_storage_at` lookups
    pub fn storage_calls(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Storage(..)))
    }

    /// Number of `get_balance` lookups
    pub fn balance_calls(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Balance(..)))
    }

    /// Number of lookups of any kind
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Forget recorded calls, keeping the served data
    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn count(&self, f: impl Fn(&SourceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| f(call)).count()
    }

    fn record(&self, call: SourceCall) -> RpcResult<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }
        Ok(state)
    }
}

impl StateSource for MockStateSource {
    fn get_code(&self, address: &Address, block: BlockTag) -> RpcResult<Vec<u8>> {
        let state = self.record(SourceCall::Code(*address, block))?;
        Ok(state.code.get(address).cloned().unwrap_or_default())
    }

    fn get_storage_at(&self, address: &Address, slot: &H256, block: BlockTag) -> RpcResult<H256> {
        let state = self.record(SourceCall::Storage(*address, *slot, block))?;
        Ok(state.storage.get(&(*address, *slot)).copied().unwrap_or(H256::ZERO))
    }

    fn get_balance(&self, address: &Address, block: BlockTag) -> RpcResult<U256> {
        let state = self.record(SourceCall::Balance(*address, block))?;
        Ok(state.balances.get(address).copied().unwrap_or_default())
    }
}
