//! Fork record and EIP-2930 access list

use forksim_primitives::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// An (address, slot) pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey(pub Address, pub H256);

/// One address and the slots touched on it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    /// Account address
    pub address: Address,
    /// Slots in first-touch order
    pub storage_keys: Vec<H256>,
}

/// Access list in first-touch order; each address appears once and no slot
/// repeats within an address
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessList(Vec<AccessListItem>);

impl AccessList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in order
    pub fn items(&self) -> &[AccessListItem] {
        &self.0
    }

    /// Number of addresses
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of storage keys across all entries
    pub fn storage_key_count(&self) -> usize {
        self.0.iter().map(|item| item.storage_keys.len()).sum()
    }

    /// Every (address, slot) pair in order
    pub fn storage_keys(&self) -> impl Iterator<Item = StorageKey> + '_ {
        self.0
            .iter()
            .flat_map(|item| item.storage_keys.iter().map(move |slot| StorageKey(item.address, *slot)))
    }
}

impl From<Vec<AccessListItem>> for AccessList {
    fn from(items: Vec<AccessListItem>) -> Self {
        AccessListBuilder::from_items(items).finish()
    }
}

/// Builds an [`AccessList`] from storage touches in execution order
#[derive(Clone, Debug, Default)]
pub struct AccessListBuilder {
    items: Vec<AccessListItem>,
    positions: HashMap<Address, usize>,
    listed: HashSet<StorageKey>,
}

impl AccessListBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn from_items(items: Vec<AccessListItem>) -> Self {
        let mut builder = Self::new();
        for item in items {
            for slot in item.storage_keys {
                builder.touch(item.address, slot);
            }
        }
        builder
    }

    /// Record a touch; returns whether the pair was new
    pub fn touch(&mut self, address: Address, slot: H256) -> bool {
        if !self.listed.insert(StorageKey(address, slot)) {
            return false;
        }
        match self.positions.get(&address) {
            Some(&index) => self.items[index].storage_keys.push(slot),
            None => {
                self.positions.insert(address, self.items.len());
                self.items.push(AccessListItem {
                    address,
                    storage_keys: vec![slot],
                });
            }
        }
        true
    }

    /// The list so far
    pub fn finish(self) -> AccessList {
        AccessList(self.items)
    }
}

/// Facts fetched from the remote source, and the access list of the run
/// that last used this record.
///
/// The sets only grow. A fact in a set is never fetched again while the
/// record lives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkRecord {
    /// Addresses whose code was fetched
    pub code: BTreeSet<Address>,
    /// Addresses whose balance was fetched
    pub balances: BTreeSet<Address>,
    /// Slots whose value was fetched
    pub storage: BTreeSet<StorageKey>,
    /// Storage touches in first-touch order
    pub access_list: AccessList,
}

impl ForkRecord {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `address`'s code is known
    pub fn has_code(&self, address: &Address) -> bool {
        self.code.contains(address)
    }

    /// Whether `address`'s balance is known
    pub fn has_balance(&self, address: &Address) -> bool {
        self.balances.contains(address)
    }

    /// Whether the slot's value is known
    pub fn has_storage(&self, address: &Address, slot: &H256) -> bool {
        self.storage.contains(&StorageKey(*address, *slot))
    }

    /// Union of both records' sets; the access list stays as it is
    pub fn merge(&mut self, other: &ForkRecord) {
        self.code.extend(other.code.iter().copied());
        self.balances.extend(other.balances.iter().copied());
        self.storage.extend(other.storage.iter().copied());
    }

    /// Copy of the sets with no access list
    pub fn without_access_list(&self) -> ForkRecord {
        ForkRecord {
            code: self.code.clone(),
            balances: self.balances.clone(),
            storage: self.storage.clone(),
            access_list: AccessList::new(),
        }
    }

    /// Detach the access list
    pub fn take_access_list(&mut self) -> AccessList {
        std::mem::take(&mut self.access_list)
    }

    /// Same sets, given access list
    pub fn with_access_list(mut self, access_list: AccessList) -> Self {
        self.access_list = access_list;
        self
    }

    /// Total number of recorded facts
    pub fn fact_count(&self) -> usize {
        self.code.len() + self.balances.len() + self.storage.len()
    }
}
