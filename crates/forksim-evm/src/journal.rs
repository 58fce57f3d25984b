//! Journaled transaction state over a [`State`] baseline

use crate::error::{EvmError, EvmResult};
use crate::state::StateAccess;
use forksim_crypto::keccak256;
use forksim_primitives::{Address, H256, U256};
use forksim_storage::{Account, State, StateCache, StateWriter, StorageError, EMPTY_CODE_HASH};
use std::collections::{HashMap, HashSet};

/// Undo record for one journaled change
#[derive(Clone, Debug)]
enum JournalEntry {
    Account {
        address: Address,
        previous: Option<Option<Account>>,
    },
    Storage {
        address: Address,
        key: H256,
        previous: Option<H256>,
    },
    Transient {
        address: Address,
        key: H256,
        previous: H256,
    },
    WarmAddress(Address),
    WarmSlot(Address, H256),
    Refund(u64),
    Created(Address),
}

/// Transaction-scoped state.
///
/// Writes go to an overlay and are journaled; the baseline `db` only changes
/// through the `preload_*` methods. [`JournaledState::into_writes`] hands the
/// overlay back once the transaction is done.
pub struct JournaledState<'a, S: State> {
    db: &'a mut S,
    overlay: StateCache,
    journal: Vec<JournalEntry>,
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<(Address, H256)>,
    original: HashMap<(Address, H256), H256>,
    transient: HashMap<(Address, H256), H256>,
    refund: u64,
    created: HashSet<Address>,
}

impl<'a, S: State> JournaledState<'a, S> {
    /// Fresh transaction over `db`
    pub fn new(db: &'a mut S) -> Self {
        Self::with_pending(db, StateCache::new())
    }

    /// Start on top of writes an earlier transaction left uncommitted
    pub fn with_pending(db: &'a mut S, pending: StateCache) -> Self {
        Self {
            db,
            overlay: pending,
            journal: Vec::new(),
            warm_addresses: HashSet::new(),
            warm_slots: HashSet::new(),
            original: HashMap::new(),
            transient: HashMap::new(),
            refund: 0,
            created: HashSet::new(),
        }
    }

    /// Read-only view of the baseline
    pub fn db(&self) -> &S {
        self.db
    }

    /// Everything written so far
    pub fn writes(&self) -> &StateCache {
        &self.overlay
    }

    /// Finish the transaction and return its writes
    pub fn into_writes(self) -> StateCache {
        self.overlay
    }

    fn account(&self, address: &Address) -> EvmResult<Option<Account>> {
        match self.overlay.cached_account(address) {
            Some(entry) => Ok(entry.cloned()),
            None => Ok(self.db.get_account(address)?),
        }
    }

    fn put_account(&mut self, address: Address, account: Option<Account>) -> EvmResult<()> {
        let previous = self.overlay.cached_account(&address).map(|a| a.cloned());
        self.journal.push(JournalEntry::Account { address, previous });
        match account {
            Some(account) => self.overlay.set_account(address, account)?,
            None => self.overlay.delete_account(&address)?,
        }
        Ok(())
    }

    fn update_account(&mut self, address: &Address, f: impl FnOnce(&mut Account)) -> EvmResult<()> {
        let mut account = self.account(address)?.unwrap_or_default();
        f(&mut account);
        self.put_account(*address, Some(account))
    }

    /// Apply `f` to every overlay and journal copy of an account, so that
    /// neither shadowing nor a later revert hides a preloaded fact.
    fn patch_account(&mut self, address: &Address, f: impl Fn(&mut Account)) -> EvmResult<()> {
        if let Some(Some(account)) = self.overlay.cached_account(address) {
            let mut account = account.clone();
            f(&mut account);
            self.overlay.set_account(*address, account)?;
        }
        for entry in &mut self.journal {
            if let JournalEntry::Account {
                address: entry_address,
                previous: Some(Some(account)),
            } = entry
            {
                if entry_address == address {
                    f(account);
                }
            }
        }
        Ok(())
    }
}

impl<S: State> StateAccess for JournaledState<'_, S> {
    fn account_exists(&self, address: &Address) -> EvmResult<bool> {
        Ok(self.account(address)?.is_some())
    }

    fn is_empty(&self, address: &Address) -> EvmResult<bool> {
        Ok(match self.account(address)? {
            Some(account) => account.is_empty(),
            None => true,
        })
    }

    fn get_balance(&self, address: &Address) -> EvmResult<U256> {
        Ok(self.account(address)?.map(|a| a.balance).unwrap_or_default())
    }

    fn get_nonce(&self, address: &Address) -> EvmResult<u64> {
        Ok(self.account(address)?.map_or(0, |a| a.nonce))
    }

    fn get_code(&self, address: &Address) -> EvmResult<Vec<u8>> {
        let code_hash = match self.account(address)? {
            Some(account) if account.has_code() => account.code_hash,
            _ => return Ok(Vec::new()),
        };
        if let Some(code) = self.overlay.cached_code(&code_hash) {
            return Ok(code.clone());
        }
        let code = self.db.get_code(&code_hash)?.ok_or(StorageError::MissingCode {
            address: *address,
            code_hash,
        })?;
        Ok(code)
    }

    fn get_code_hash(&self, address: &Address) -> EvmResult<H256> {
        Ok(self.account(address)?.map_or(H256::ZERO, |a| a.code_hash))
    }

    fn get_storage(&self, address: &Address, key: &H256) -> EvmResult<H256> {
        match self.overlay.cached_storage(address, key) {
            Some(value) => Ok(value),
            None => Ok(self.db.get_storage(address, key)?),
        }
    }

    fn get_original_storage(&self, address: &Address, key: &H256) -> EvmResult<H256> {
        match self.original.get(&(*address, *key)) {
            Some(value) => Ok(*value),
            None => self.get_storage(address, key),
        }
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) -> EvmResult<()> {
        if !self.original.contains_key(&(address, key)) {
            let current = self.get_storage(&address, &key)?;
            self.original.insert((address, key), current);
        }
        let previous = self.overlay.cached_storage(&address, &key);
        self.journal.push(JournalEntry::Storage {
            address,
            key,
            previous,
        });
        self.overlay.set_storage(address, key, value)?;
        Ok(())
    }

    fn get_transient(&self, address: &Address, key: &H256) -> H256 {
        self.transient
            .get(&(*address, *key))
            .copied()
            .unwrap_or(H256::ZERO)
    }

    fn set_transient(&mut self, address: Address, key: H256, value: H256) {
        let previous = self
            .transient
            .insert((address, key), value)
            .unwrap_or(H256::ZERO);
        self.journal.push(JournalEntry::Transient {
            address,
            key,
            previous,
        });
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: U256) -> EvmResult<()> {
        if value.is_zero() {
            return Ok(());
        }
        let balance = self.get_balance(from)?;
        if balance < value {
            return Err(EvmError::InsufficientBalance);
        }
        if from == to {
            return Ok(());
        }
        self.update_account(from, |a| a.balance -= value)?;
        self.update_account(to, |a| a.balance = a.balance.saturating_add(value))
    }

    fn increment_nonce(&mut self, address: &Address) -> EvmResult<u64> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.nonce = account.nonce.checked_add(1).ok_or(EvmError::NonceOverflow)?;
        let nonce = account.nonce;
        self.put_account(*address, Some(account))?;
        Ok(nonce)
    }

    fn create_account(&mut self, address: &Address) -> EvmResult<()> {
        let balance = self.get_balance(address)?;
        self.put_account(
            *address,
            Some(Account {
                nonce: 1,
                balance,
                code_hash: EMPTY_CODE_HASH,
            }),
        )?;
        if self.created.insert(*address) {
            self.journal.push(JournalEntry::Created(*address));
        }
        Ok(())
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) -> EvmResult<()> {
        let code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            let hash = keccak256(&code);
            self.overlay.set_code(hash, code)?;
            hash
        };
        self.update_account(address, |a| a.code_hash = code_hash)
    }

    fn selfdestruct(&mut self, address: &Address, beneficiary: &Address) -> EvmResult<()> {
        let balance = self.get_balance(address)?;
        if beneficiary != address {
            self.update_account(beneficiary, |a| a.balance = a.balance.saturating_add(balance))?;
            self.update_account(address, |a| a.balance = U256::zero())?;
        }
        if self.created.contains(address) {
            self.put_account(*address, None)?;
        }
        Ok(())
    }

    fn warm_address(&mut self, address: &Address) -> bool {
        if self.warm_addresses.insert(*address) {
            self.journal.push(JournalEntry::WarmAddress(*address));
            false
        } else {
            true
        }
    }

    fn warm_storage(&mut self, address: &Address, key: &H256) -> bool {
        if self.warm_slots.insert((*address, *key)) {
            self.journal.push(JournalEntry::WarmSlot(*address, *key));
            false
        } else {
            true
        }
    }

    fn add_refund(&mut self, amount: u64) {
        self.journal.push(JournalEntry::Refund(self.refund));
        self.refund = self.refund.saturating_add(amount);
    }

    fn sub_refund(&mut self, amount: u64) {
        self.journal.push(JournalEntry::Refund(self.refund));
        self.refund = self.refund.saturating_sub(amount);
    }

    fn refund(&self) -> u64 {
        self.refund
    }

    fn snapshot(&mut self) -> usize {
        self.journal.len()
    }

    fn revert_to_snapshot(&mut self, snapshot: usize) {
        while self.journal.len() > snapshot {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::Account { address, previous } => {
                    self.overlay.restore_account(address, previous)
                }
                JournalEntry::Storage {
                    address,
                    key,
                    previous,
                } => self.overlay.restore_storage(address, key, previous),
                JournalEntry::Transient {
                    address,
                    key,
                    previous,
                } => {
                    self.transient.insert((address, key), previous);
                }
                JournalEntry::WarmAddress(address) => {
                    self.warm_addresses.remove(&address);
                }
                JournalEntry::WarmSlot(address, key) => {
                    self.warm_slots.remove(&(address, key));
                }
                JournalEntry::Refund(previous) => self.refund = previous,
                JournalEntry::Created(address) => {
                    self.created.remove(&address);
                }
            }
        }
    }

    fn preload_code(&mut self, address: &Address, code: Vec<u8>) -> EvmResult<()> {
        if code.is_empty() {
            self.db.create_account(address)?;
            return Ok(());
        }
        let code_hash = self.db.set_account_code(address, code)?;
        self.patch_account(address, |a| {
            if !a.has_code() {
                a.code_hash = code_hash;
            }
        })
    }

    fn preload_storage(&mut self, address: &Address, key: &H256, value: H256) -> EvmResult<()> {
        self.db.set_storage(*address, *key, value)?;
        Ok(())
    }

    fn preload_balance_credit(&mut self, address: &Address, amount: U256) -> EvmResult<()> {
        self.db.add_balance(address, amount)?;
        self.patch_account(address, |a| a.balance = a.balance.saturating_add(amount))
    }
}
