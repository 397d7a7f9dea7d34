//! Account model and state access traits

use crate::error::{EvmError, EvmResult};
use primitive_types::U256;
use std::collections::BTreeMap;
use xledger_crypto::keccak256;
use xledger_primitives::{Address, Word, H256};

/// Account data
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Account address
    pub address: Address,
    /// Account balance
    pub balance: U256,
    /// EVM bytecode (empty for plain accounts)
    pub code: Vec<u8>,
    /// Name of the native contract served at this address, if any
    pub native: Option<String>,
    /// Account sequence number
    pub sequence: u64,
}

impl Account {
    /// Create a new empty account
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    /// keccak256 of the code
    pub fn code_hash(&self) -> H256 {
        keccak256(&self.code)
    }

    /// Credit the balance
    pub fn add_to_balance(&mut self, amount: U256) -> EvmResult<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| EvmError::State(format!("balance overflow for {}", self.address)))?;
        Ok(())
    }

    /// Debit the balance
    pub fn subtract_from_balance(&mut self, amount: U256) -> EvmResult<()> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(EvmError::InsufficientBalance)?;
        Ok(())
    }
}

/// Read access to state
pub trait StateReader {
    /// Get account by address
    fn get_account(&self, address: &Address) -> EvmResult<Option<Account>>;

    /// Get storage value; unset slots read as zero
    fn get_storage(&self, address: &Address, key: &Word) -> EvmResult<Word>;

    /// Check if account exists
    fn account_exists(&self, address: &Address) -> EvmResult<bool> {
        Ok(self.get_account(address)?.is_some())
    }
}

/// Write access to state
pub trait StateWriter {
    /// Insert or replace an account
    fn update_account(&mut self, account: Account) -> EvmResult<()>;

    /// Delete an account together with its storage
    fn remove_account(&mut self, address: &Address) -> EvmResult<()>;

    /// Set storage value; writing zero clears the slot
    fn set_storage(&mut self, address: Address, key: Word, value: Word) -> EvmResult<()>;
}

/// Combined read/write access
pub trait StateReaderWriter: StateReader + StateWriter {}

impl<T: StateReader + StateWriter + ?Sized> StateReaderWriter for T {}

/// In-memory state with deterministic iteration order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryState {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<(Address, Word), Word>,
}

impl MemoryState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style account insertion
    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.address, account);
        self
    }

    /// All accounts in address order
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Storage slots of one account in key order
    pub fn storage_of(&self, address: Address) -> impl Iterator<Item = (&Word, &Word)> + '_ {
        self.storage
            .range((address, Word::ZERO)..)
            .take_while(move |((owner, _), _)| *owner == address)
            .map(|((_, key), value)| (key, value))
    }

    /// Number of non-zero storage slots across all accounts
    pub fn storage_count(&self) -> usize {
        self.storage.len()
    }
}

impl StateReader for MemoryState {
    fn get_account(&self, address: &Address) -> EvmResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    fn get_storage(&self, address: &Address, key: &Word) -> EvmResult<Word> {
        Ok(self.storage.get(&(*address, *key)).copied().unwrap_or(Word::ZERO))
    }
}

impl StateWriter for MemoryState {
    fn update_account(&mut self, account: Account) -> EvmResult<()> {
        self.accounts.insert(account.address, account);
        Ok(())
    }

    fn remove_account(&mut self, address: &Address) -> EvmResult<()> {
        self.accounts.remove(address);
        self.storage.retain(|(owner, _), _| owner != address);
        Ok(())
    }

    fn set_storage(&mut self, address: Address, key: Word, value: Word) -> EvmResult<()> {
        if value.is_zero() {
            self.storage.remove(&(address, key));
        } else {
            self.storage.insert((address, key), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_balance_helpers() {
        let mut account = Account::new(addr(1));
        account.add_to_balance(U256::from(10)).unwrap();
        account.subtract_from_balance(U256::from(4)).unwrap();
        assert_eq!(account.balance, U256::from(6));
        assert_eq!(
            account.subtract_from_balance(U256::from(7)),
            Err(EvmError::InsufficientBalance)
        );
        assert_eq!(account.balance, U256::from(6));
    }

    #[test]
    fn test_balance_overflow() {
        let mut account = Account::new(addr(1));
        account.balance = U256::MAX;
        assert!(matches!(
            account.add_to_balance(U256::one()),
            Err(EvmError::State(_))
        ));
    }

    #[test]
    fn test_code_hash_of_empty_code() {
        let account = Account::new(addr(1));
        assert!(!account.has_code());
        assert_eq!(
            account.code_hash().to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_memory_state_accounts() {
        let mut state = MemoryState::new();
        assert!(!state.account_exists(&addr(1)).unwrap());

        state.update_account(Account::new(addr(1))).unwrap();
        assert!(state.account_exists(&addr(1)).unwrap());

        state.remove_account(&addr(1)).unwrap();
        assert_eq!(state.get_account(&addr(1)).unwrap(), None);
    }

    #[test]
    fn test_memory_state_storage() {
        let mut state = MemoryState::new();
        let key = Word::from_u64(1);

        assert_eq!(state.get_storage(&addr(1), &key).unwrap(), Word::ZERO);
        state.set_storage(addr(1), key, Word::from_u64(9)).unwrap();
        state.set_storage(addr(2), key, Word::from_u64(8)).unwrap();
        assert_eq!(state.get_storage(&addr(1), &key).unwrap(), Word::from_u64(9));

        let slots: Vec<_> = state.storage_of(addr(1)).collect();
        assert_eq!(slots, vec![(&key, &Word::from_u64(9))]);

        state.set_storage(addr(1), key, Word::ZERO).unwrap();
        assert_eq!(state.storage_count(), 1);
    }

    #[test]
    fn test_remove_account_clears_storage() {
        let mut state = MemoryState::new().with_account(Account::new(addr(1)));
        state.set_storage(addr(1), Word::ONE, Word::ONE).unwrap();
        state.remove_account(&addr(1)).unwrap();
        assert_eq!(state.get_storage(&addr(1), &Word::ONE).unwrap(), Word::ZERO);
    }
}
