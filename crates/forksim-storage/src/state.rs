//! Committed snapshots, the root registry and mutable working copies

use crate::error::{StorageError, StorageResult};
use crate::traits::{Account, StateReader, StateWriter, EMPTY_CODE_HASH};
use forksim_crypto::Keccak256Hasher;
use forksim_primitives::{Address, H256};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// In-memory state cache for batching changes
#[derive(Clone, Debug, Default)]
pub struct StateCache {
    /// Cached accounts (None = deleted)
    accounts: HashMap<Address, Option<Account>>,
    /// Cached storage
    storage: HashMap<(Address, H256), H256>,
    /// Cached code
    code: HashMap<H256, Vec<u8>>,
}

impl StateCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all cached changes
    pub fn clear(&mut self) {
        self.accounts.clear();
        self.storage.clear();
        self.code.clear();
    }

    /// Get number of cached account changes
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Get number of cached storage changes
    pub fn storage_count(&self) -> usize {
        self.storage.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty() && self.code.is_empty()
    }

    /// Cached view of an account: `None` if untouched, `Some(None)` if deleted
    pub fn cached_account(&self, address: &Address) -> Option<Option<&Account>> {
        self.accounts.get(address).map(Option::as_ref)
    }

    /// Cached storage value, if this cache has written the slot
    pub fn cached_storage(&self, address: &Address, key: &H256) -> Option<H256> {
        self.storage.get(&(*address, *key)).copied()
    }

    /// Cached code blob, if present
    pub fn cached_code(&self, code_hash: &H256) -> Option<&Vec<u8>> {
        self.code.get(code_hash)
    }

    /// Put an account entry back to an earlier cached view, `None` meaning untouched
    pub fn restore_account(&mut self, address: Address, previous: Option<Option<Account>>) {
        match previous {
            Some(entry) => self.accounts.insert(address, entry),
            None => self.accounts.remove(&address),
        };
    }

    /// Put a storage entry back to an earlier cached value, `None` meaning untouched
    pub fn restore_storage(&mut self, address: Address, key: H256, previous: Option<H256>) {
        match previous {
            Some(value) => self.storage.insert((address, key), value),
            None => self.storage.remove(&(address, key)),
        };
    }

    /// Layer `other` on top of this cache; entries in `other` win.
    pub fn extend(&mut self, other: StateCache) {
        self.accounts.extend(other.accounts);
        self.storage.extend(other.storage);
        self.code.extend(other.code);
    }

    /// Write every cached change into `target`.
    pub fn apply_to<W: StateWriter + ?Sized>(&self, target: &mut W) -> StorageResult<()> {
        for (code_hash, code) in &self.code {
            target.set_code(*code_hash, code.clone())?;
        }
        for (address, account) in &self.accounts {
            match account {
                Some(account) => target.set_account(*address, account.clone())?,
                None => target.delete_account(address)?,
            }
        }
        for ((address, key), value) in &self.storage {
            target.set_storage(*address, *key, *value)?;
        }
        Ok(())
    }
}

impl StateReader for StateCache {
    fn get_account(&self, address: &Address) -> StorageResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned().flatten())
    }

    fn get_storage(&self, address: &Address, key: &H256) -> StorageResult<H256> {
        Ok(self.storage.get(&(*address, *key)).copied().unwrap_or(H256::ZERO))
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.code.get(code_hash).cloned())
    }
}

impl StateWriter for StateCache {
    fn set_account(&mut self, address: Address, account: Account) -> StorageResult<()> {
        self.accounts.insert(address, Some(account));
        Ok(())
    }

    fn delete_account(&mut self, address: &Address) -> StorageResult<()> {
        self.accounts.insert(*address, None);
        Ok(())
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) -> StorageResult<()> {
        self.storage.insert((address, key), value);
        Ok(())
    }

    fn set_code(&mut self, code_hash: H256, code: Vec<u8>) -> StorageResult<()> {
        self.code.insert(code_hash, code);
        Ok(())
    }
}

/// Immutable committed state content.
///
/// Ordered maps keep root computation independent of insertion order.
/// Zero storage values are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<(Address, H256), H256>,
    code: BTreeMap<H256, Vec<u8>>,
}

impl Snapshot {
    /// Number of accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of non-zero storage slots
    pub fn storage_count(&self) -> usize {
        self.storage.len()
    }

    /// Iterate accounts in address order
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Iterate non-zero storage slots in (address, slot) order
    pub fn storage(&self) -> impl Iterator<Item = (&(Address, H256), &H256)> {
        self.storage.iter()
    }

    /// Content-derived root over accounts and non-zero storage.
    pub fn root(&self) -> H256 {
        let mut hasher = Keccak256Hasher::new();
        hasher.update((self.accounts.len() as u64).to_be_bytes());
        for (address, account) in &self.accounts {
            hasher.update(address);
            hasher.update(account.to_bytes());
        }
        hasher.update((self.storage.len() as u64).to_be_bytes());
        for ((address, key), value) in &self.storage {
            hasher.update(address);
            hasher.update(key);
            hasher.update(value);
        }
        hasher.finalize()
    }

    fn apply(&mut self, cache: &StateCache) {
        for (code_hash, code) in &cache.code {
            self.code.insert(*code_hash, code.clone());
        }
        for (address, account) in &cache.accounts {
            match account {
                Some(account) => {
                    self.accounts.insert(*address, account.clone());
                }
                None => {
                    self.accounts.remove(address);
                }
            }
        }
        for ((address, key), value) in &cache.storage {
            if value.is_zero() {
                self.storage.remove(&(*address, *key));
            } else {
                self.storage.insert((*address, *key), *value);
            }
        }
    }

    /// Every account with code must have its code blob stored.
    fn verify_code(&self) -> StorageResult<()> {
        for (address, account) in &self.accounts {
            if account.code_hash != EMPTY_CODE_HASH && !self.code.contains_key(&account.code_hash) {
                return Err(StorageError::MissingCode {
                    address: *address,
                    code_hash: account.code_hash,
                });
            }
        }
        Ok(())
    }
}

impl StateReader for Snapshot {
    fn get_account(&self, address: &Address) -> StorageResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    fn get_storage(&self, address: &Address, key: &H256) -> StorageResult<H256> {
        Ok(self
            .storage
            .get(&(*address, *key))
            .copied()
            .unwrap_or(H256::ZERO))
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.code.get(code_hash).cloned())
    }
}

/// Registry of committed snapshots addressed by root.
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone, Debug)]
pub struct StateDb {
    snapshots: Arc<RwLock<HashMap<H256, Arc<Snapshot>>>>,
    empty_root: H256,
}

impl Default for StateDb {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDb {
    /// Create a registry holding only the empty state
    pub fn new() -> Self {
        let empty = Snapshot::default();
        let empty_root = empty.root();
        let mut snapshots = HashMap::new();
        snapshots.insert(empty_root, Arc::new(empty));
        Self {
            snapshots: Arc::new(RwLock::new(snapshots)),
            empty_root,
        }
    }

    /// Root of the empty state
    pub fn empty_root(&self) -> H256 {
        self.empty_root
    }

    /// Whether a snapshot is registered under `root`
    pub fn contains(&self, root: &H256) -> bool {
        self.snapshots.read().contains_key(root)
    }

    /// Number of registered snapshots
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Check if only the empty snapshot is registered
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Reopen a committed root as an independent working copy
    pub fn open(&self, root: H256) -> StorageResult<WorkingState> {
        let base = self
            .snapshots
            .read()
            .get(&root)
            .cloned()
            .ok_or(StorageError::UnknownRoot(root))?;
        Ok(WorkingState {
            db: self.clone(),
            base,
            root,
            cache: StateCache::new(),
        })
    }

    /// Open a working copy of the empty state
    pub fn open_empty(&self) -> WorkingState {
        WorkingState {
            db: self.clone(),
            base: Arc::new(Snapshot::default()),
            root: self.empty_root,
            cache: StateCache::new(),
        }
    }

    fn insert(&self, root: H256, snapshot: Arc<Snapshot>) {
        self.snapshots.write().entry(root).or_insert(snapshot);
    }
}

/// Mutable state layered over a committed snapshot.
///
/// Writes stay in a private cache until [`WorkingState::commit`]. Cloning
/// gives an independent copy that shares only the immutable base.
#[derive(Clone, Debug)]
pub struct WorkingState {
    db: StateDb,
    base: Arc<Snapshot>,
    root: H256,
    cache: StateCache,
}

impl WorkingState {
    /// Root of the snapshot this copy was opened from or last committed to
    pub fn base_root(&self) -> H256 {
        self.root
    }

    /// Registry this copy commits into
    pub fn db(&self) -> &StateDb {
        &self.db
    }

    /// Whether uncommitted changes exist
    pub fn is_dirty(&self) -> bool {
        !self.cache.is_empty()
    }

    /// Fold pending changes into a new snapshot, register it and rebase on it.
    pub fn commit(&mut self) -> StorageResult<H256> {
        let mut next = (*self.base).clone();
        next.apply(&self.cache);
        next.verify_code()?;
        let root = next.root();
        let next = Arc::new(next);
        self.db.insert(root, Arc::clone(&next));
        debug!(
            %root,
            accounts = next.account_count(),
            slots = next.storage_count(),
            "committed state"
        );
        self.base = next;
        self.root = root;
        self.cache.clear();
        Ok(root)
    }
}

impl StateReader for WorkingState {
    fn get_account(&self, address: &Address) -> StorageResult<Option<Account>> {
        match self.cache.cached_account(address) {
            Some(cached) => Ok(cached.cloned()),
            None => self.base.get_account(address),
        }
    }

    fn get_storage(&self, address: &Address, key: &H256) -> StorageResult<H256> {
        match self.cache.cached_storage(address, key) {
            Some(value) => Ok(value),
            None => self.base.get_storage(address, key),
        }
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        if let Some(code) = self.cache.cached_code(code_hash) {
            return Ok(Some(code.clone()));
        }
        self.base.get_code(code_hash)
    }
}

impl StateWriter for WorkingState {
    fn set_account(&mut self, address: Address, account: Account) -> StorageResult<()> {
        self.cache.set_account(address, account)
    }

    fn delete_account(&mut self, address: &Address) -> StorageResult<()> {
        self.cache.delete_account(address)
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) -> StorageResult<()> {
        self.cache.set_storage(address, key, value)
    }

    fn set_code(&mut self, code_hash: H256, code: Vec<u8>) -> StorageResult<()> {
        self.cache.set_code(code_hash, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forksim_primitives::U256;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn slot(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    #[test]
    fn test_state_cache() {
        let mut cache = StateCache::new();
        let account = Account {
            nonce: 1,
            balance: U256::from(500u64),
            ..Default::default()
        };
        cache.set_account(addr(0x42), account).unwrap();

        assert_eq!(cache.account_count(), 1);
        let read = cache.get_account(&addr(0x42)).unwrap().unwrap();
        assert_eq!(read.balance, U256::from(500u64));

        cache.delete_account(&addr(0x42)).unwrap();
        assert!(cache.get_account(&addr(0x42)).unwrap().is_none());
        assert_eq!(cache.cached_account(&addr(0x42)), Some(None));
    }

    #[test]
    fn test_cache_restore_entries() {
        let mut cache = StateCache::new();
        cache.set_account(addr(1), Account::new()).unwrap();
        cache.set_storage(addr(1), slot(0), slot(5)).unwrap();

        cache.restore_account(addr(1), None);
        cache.restore_storage(addr(1), slot(0), None);
        assert!(cache.is_empty());

        cache.restore_account(addr(2), Some(None));
        cache.restore_storage(addr(2), slot(3), Some(slot(9)));
        assert_eq!(cache.cached_account(&addr(2)), Some(None));
        assert_eq!(cache.cached_storage(&addr(2), &slot(3)), Some(slot(9)));
    }

    #[test]
    fn test_cache_extend_later_layer_wins() {
        let mut lower = StateCache::new();
        lower.set_storage(addr(1), slot(0), slot(1)).unwrap();
        lower.set_storage(addr(1), slot(1), slot(7)).unwrap();

        let mut upper = StateCache::new();
        upper.set_storage(addr(1), slot(0), slot(2)).unwrap();

        lower.extend(upper);
        assert_eq!(lower.get_storage(&addr(1), &slot(0)).unwrap(), slot(2));
        assert_eq!(lower.get_storage(&addr(1), &slot(1)).unwrap(), slot(7));
    }

    #[test]
    fn test_working_state_layering() {
        let db = StateDb::new();
        let mut state = db.open(db.empty_root()).unwrap();
        state.set_balance(&addr(1), U256::from(100u64)).unwrap();
        let root = state.commit().unwrap();

        let mut copy = db.open(root).unwrap();
        assert_eq!(copy.get_balance(&addr(1)).unwrap(), U256::from(100u64));

        copy.set_balance(&addr(1), U256::from(200u64)).unwrap();
        assert_eq!(copy.get_balance(&addr(1)).unwrap(), U256::from(200u64));

        // the original copy is untouched
        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::from(100u64));
    }

    #[test]
    fn test_commit_and_reopen() {
        let db = StateDb::new();
        let mut state = db.open_empty();
        state.set_account_code(&addr(0x11), vec![0x60, 0x00]).unwrap();
        state.set_storage(addr(0x11), slot(0), slot(32)).unwrap();
        assert!(state.is_dirty());

        let root = state.commit().unwrap();
        assert!(!state.is_dirty());
        assert_eq!(state.base_root(), root);
        assert!(db.contains(&root));

        let reopened = db.open(root).unwrap();
        assert_eq!(reopened.get_account_code(&addr(0x11)).unwrap(), vec![0x60, 0x00]);
        assert_eq!(reopened.get_storage(&addr(0x11), &slot(0)).unwrap(), slot(32));
    }

    #[test]
    fn test_root_is_content_derived() {
        let db = StateDb::new();

        let mut a = db.open_empty();
        a.set_storage(addr(1), slot(1), slot(10)).unwrap();
        a.set_balance(&addr(2), U256::from(5u64)).unwrap();

        let mut b = db.open_empty();
        b.set_balance(&addr(2), U256::from(5u64)).unwrap();
        b.set_storage(addr(1), slot(1), slot(10)).unwrap();

        assert_eq!(a.commit().unwrap(), b.commit().unwrap());

        let mut c = db.open_empty();
        c.set_balance(&addr(2), U256::from(6u64)).unwrap();
        assert_ne!(c.commit().unwrap(), a.base_root());
    }

    #[test]
    fn test_zero_storage_is_dropped_on_commit() {
        let db = StateDb::new();
        let mut state = db.open_empty();
        state.set_storage(addr(1), slot(1), slot(10)).unwrap();
        state.commit().unwrap();
        state.set_storage(addr(1), slot(1), H256::ZERO).unwrap();
        let root = state.commit().unwrap();
        assert_eq!(root, db.empty_root());
    }

    #[test]
    fn test_unknown_root() {
        let db = StateDb::new();
        let root = H256::from_bytes([0xaa; 32]);
        assert_eq!(db.open(root).unwrap_err(), StorageError::UnknownRoot(root));
    }

    #[test]
    fn test_commit_rejects_dangling_code_hash() {
        let db = StateDb::new();
        let mut state = db.open_empty();
        let dangling = H256::from_bytes([0x42; 32]);
        state
            .set_account(
                addr(1),
                Account {
                    code_hash: dangling,
                    ..Account::new()
                },
            )
            .unwrap();
        assert_eq!(
            state.commit().unwrap_err(),
            StorageError::MissingCode {
                address: addr(1),
                code_hash: dangling
            }
        );
    }

    #[test]
    fn test_apply_to_replays_changes() {
        let db = StateDb::new();
        let mut cache = StateCache::new();
        cache.set_balance(&addr(3), U256::from(9u64)).unwrap();
        cache.set_storage(addr(3), slot(2), slot(4)).unwrap();

        let mut state = db.open_empty();
        cache.apply_to(&mut state).unwrap();
        assert_eq!(state.get_balance(&addr(3)).unwrap(), U256::from(9u64));
        assert_eq!(state.get_storage(&addr(3), &slot(2)).unwrap(), slot(4));
    }

    #[test]
    fn test_registry_is_shared_between_clones() {
        let db = StateDb::new();
        let other = db.clone();
        let mut state = db.open_empty();
        state.set_balance(&addr(1), U256::one()).unwrap();
        let root = state.commit().unwrap();
        assert!(other.open(root).is_ok());
        assert_eq!(other.len(), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn root_ignores_write_order(writes in proptest::collection::vec((0u64..8, 0u64..8, 1u64..1000), 0..24)) {
                let db = StateDb::new();
                let mut forward = db.open_empty();
                let mut backward = db.open_empty();

                // last write per slot wins, so dedupe first
                let mut last: BTreeMap<(u64, u64), u64> = BTreeMap::new();
                for (a, s, v) in &writes {
                    last.insert((*a, *s), *v);
                }
                for ((a, s), v) in last.iter() {
                    forward.set_storage(addr(*a), slot(*s), slot(*v)).unwrap();
                }
                for ((a, s), v) in last.iter().rev() {
                    backward.set_storage(addr(*a), slot(*s), slot(*v)).unwrap();
                }
                prop_assert_eq!(forward.commit().unwrap(), backward.commit().unwrap());
            }
        }
    }
}
