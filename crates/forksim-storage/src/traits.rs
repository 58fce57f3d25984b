//! Storage traits for state access

use crate::error::{StorageError, StorageResult};
use forksim_crypto::keccak256;
use forksim_primitives::{Address, H256, U256};

pub use forksim_crypto::EMPTY_CODE_HASH;

/// Account data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account nonce
    pub nonce: u64,
    /// Account balance in wei
    pub balance: U256,
    /// Code hash (keccak256 of code, or EMPTY_CODE_HASH if no code)
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

impl Account {
    /// Encoded length: nonce (8) + balance (32) + code hash (32)
    pub const ENCODED_LEN: usize = 8 + 32 + 32;

    /// Create a new empty account
    pub fn new() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code_hash: EMPTY_CODE_HASH,
        }
    }

    /// Check if account is empty (EIP-161)
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }

    /// Fixed-width big-endian encoding hashed into the state root
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        let mut balance = [0u8; 32];
        self.balance.to_big_endian(&mut balance);
        bytes.extend_from_slice(&balance);
        bytes.extend_from_slice(self.code_hash.as_bytes());
        bytes
    }
}

/// Read access to state
pub trait StateReader {
    /// Get account by address
    fn get_account(&self, address: &Address) -> StorageResult<Option<Account>>;

    /// Get storage value; unset slots read as zero
    fn get_storage(&self, address: &Address, key: &H256) -> StorageResult<H256>;

    /// Get contract code by hash
    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>>;

    /// Check if account exists
    fn account_exists(&self, address: &Address) -> StorageResult<bool> {
        Ok(self.get_account(address)?.is_some())
    }

    /// Get account nonce
    fn get_nonce(&self, address: &Address) -> StorageResult<u64> {
        Ok(self.get_account(address)?.map(|a| a.nonce).unwrap_or(0))
    }

    /// Get account balance
    fn get_balance(&self, address: &Address) -> StorageResult<U256> {
        Ok(self
            .get_account(address)?
            .map(|a| a.balance)
            .unwrap_or_default())
    }

    /// Get account code hash
    fn get_code_hash(&self, address: &Address) -> StorageResult<H256> {
        Ok(self
            .get_account(address)?
            .map(|a| a.code_hash)
            .unwrap_or(EMPTY_CODE_HASH))
    }

    /// Code deployed at an address; empty when the account has none
    fn get_account_code(&self, address: &Address) -> StorageResult<Vec<u8>> {
        let code_hash = self.get_code_hash(address)?;
        if code_hash == EMPTY_CODE_HASH {
            return Ok(Vec::new());
        }
        self.get_code(&code_hash)?
            .ok_or(StorageError::MissingCode {
                address: *address,
                code_hash,
            })
    }
}

/// Write access to state
pub trait StateWriter {
    /// Set account
    fn set_account(&mut self, address: Address, account: Account) -> StorageResult<()>;

    /// Delete account
    fn delete_account(&mut self, address: &Address) -> StorageResult<()>;

    /// Set storage value
    fn set_storage(&mut self, address: Address, key: H256, value: H256) -> StorageResult<()>;

    /// Set contract code
    fn set_code(&mut self, code_hash: H256, code: Vec<u8>) -> StorageResult<()>;

    /// Create an empty account unless one already exists
    fn create_account(&mut self, address: &Address) -> StorageResult<()>
    where
        Self: StateReader,
    {
        if !self.account_exists(address)? {
            self.set_account(*address, Account::new())?;
        }
        Ok(())
    }

    /// Store code and point the account at it, creating the account if needed
    fn set_account_code(&mut self, address: &Address, code: Vec<u8>) -> StorageResult<H256>
    where
        Self: StateReader,
    {
        let code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(&code)
        };
        if code_hash != EMPTY_CODE_HASH {
            self.set_code(code_hash, code)?;
        }
        let mut account = self.get_account(address)?.unwrap_or_default();
        account.code_hash = code_hash;
        self.set_account(*address, account)?;
        Ok(code_hash)
    }

    /// Overwrite the balance, creating the account if needed
    fn set_balance(&mut self, address: &Address, balance: U256) -> StorageResult<()>
    where
        Self: StateReader,
    {
        let mut account = self.get_account(address)?.unwrap_or_default();
        account.balance = balance;
        self.set_account(*address, account)
    }

    /// Add to balance
    fn add_balance(&mut self, address: &Address, amount: U256) -> StorageResult<()>
    where
        Self: StateReader,
    {
        let mut account = self.get_account(address)?.unwrap_or_default();
        account.balance = account.balance.saturating_add(amount);
        self.set_account(*address, account)
    }
}

/// Combined read/write state access
pub trait State: StateReader + StateWriter {}

impl<T: StateReader + StateWriter> State for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateCache;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_new_account_is_empty() {
        let account = Account::new();
        assert!(account.is_empty());
        assert!(!account.has_code());
        assert_eq!(account.to_bytes().len(), Account::ENCODED_LEN);
    }

    #[test]
    fn test_balance_or_code_makes_account_non_empty() {
        let mut funded = Account::new();
        funded.balance = U256::from(1);
        assert!(!funded.is_empty());

        let mut deployed = Account::new();
        deployed.code_hash = keccak256(&[0x00]);
        assert!(deployed.has_code());
        assert!(!deployed.is_empty());
    }

    #[test]
    fn test_encoding_tracks_every_field() {
        let base = Account::new();
        let mut nonce = base.clone();
        nonce.nonce = 1;
        let mut balance = base.clone();
        balance.balance = U256::from(1);
        assert_ne!(base.to_bytes(), nonce.to_bytes());
        assert_ne!(base.to_bytes(), balance.to_bytes());
        assert_ne!(nonce.to_bytes(), balance.to_bytes());
    }

    #[test]
    fn test_create_account_keeps_existing_balance() {
        let mut state = StateCache::new();
        state.set_balance(&addr(1), U256::from(9)).unwrap();
        state.create_account(&addr(1)).unwrap();
        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::from(9));
    }

    #[test]
    fn test_set_account_code() {
        let mut state = StateCache::new();
        let hash = state.set_account_code(&addr(1), vec![0x60, 0x00]).unwrap();
        assert_eq!(hash, keccak256(&[0x60, 0x00]));
        assert_eq!(state.get_account_code(&addr(1)).unwrap(), vec![0x60, 0x00]);

        let empty = state.set_account_code(&addr(2), Vec::new()).unwrap();
        assert_eq!(empty, EMPTY_CODE_HASH);
        assert!(state.account_exists(&addr(2)).unwrap());
        assert!(state.get_account_code(&addr(2)).unwrap().is_empty());
    }

    #[test]
    fn test_add_balance_saturates() {
        let mut state = StateCache::new();
        state.set_balance(&addr(1), U256::MAX).unwrap();
        state.add_balance(&addr(1), U256::from(1)).unwrap();
        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::MAX);
    }
}
