//! Call frames: layered write-back caches over state, one per call

use crate::error::{EvmError, EvmResult};
use crate::state::{Account, StateReader, StateReaderWriter, StateWriter};
use std::collections::BTreeMap;
use xledger_primitives::{Address, Word};

/// State view of one call.
///
/// Reads fall through to the parent; writes stay in the frame until
/// [`CallFrame::sync`] flushes them. Dropping a frame without syncing
/// discards everything it accumulated.
pub struct CallFrame<'a> {
    parent: &'a mut dyn StateReaderWriter,
    /// Cached accounts (None = removed)
    accounts: BTreeMap<Address, Option<Account>>,
    storage: BTreeMap<(Address, Word), Word>,
    depth: u64,
    max_depth: u64,
    read_only: bool,
}

impl<'a> CallFrame<'a> {
    /// Root frame over `state`. A `max_depth` of zero leaves nesting
    /// unbounded.
    pub fn new(state: &'a mut dyn StateReaderWriter, max_depth: u64) -> Self {
        Self {
            parent: state,
            accounts: BTreeMap::new(),
            storage: BTreeMap::new(),
            depth: 0,
            max_depth,
            read_only: false,
        }
    }

    /// Open a child frame one level deeper. The child inherits read-only
    /// mode.
    pub fn new_frame(&mut self) -> EvmResult<CallFrame<'_>> {
        let depth = self.depth + 1;
        if self.max_depth > 0 && depth > self.max_depth {
            return Err(EvmError::CallStackOverflow);
        }
        Ok(CallFrame {
            accounts: BTreeMap::new(),
            storage: BTreeMap::new(),
            depth,
            max_depth: self.max_depth,
            read_only: self.read_only,
            parent: self,
        })
    }

    /// Reject every subsequent write with `IllegalWrite`
    pub fn read_only(&mut self) {
        self.read_only = true;
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Nesting depth; the root frame is 0
    pub fn call_stack_depth(&self) -> u64 {
        self.depth
    }

    /// Flush accumulated changes into the parent, accounts first, each in
    /// key order.
    pub fn sync(&mut self) -> EvmResult<()> {
        tracing::debug!(
            "Sync frame depth={} accounts={} storage={}",
            self.depth,
            self.accounts.len(),
            self.storage.len()
        );
        for (address, account) in std::mem::take(&mut self.accounts) {
            match account {
                Some(account) => self.parent.update_account(account)?,
                None => self.parent.remove_account(&address)?,
            }
        }
        for ((address, key), value) in std::mem::take(&mut self.storage) {
            self.parent.set_storage(address, key, value)?;
        }
        Ok(())
    }

    fn ensure_writable(&self) -> EvmResult<()> {
        if self.read_only {
            Err(EvmError::IllegalWrite)
        } else {
            Ok(())
        }
    }

    /// Accounts removed in this frame stay dead until it is synced or
    /// dropped.
    fn ensure_not_removed(&self, address: &Address) -> EvmResult<()> {
        match self.accounts.get(address) {
            Some(None) => Err(EvmError::IllegalWrite),
            _ => Ok(()),
        }
    }
}

impl StateReader for CallFrame<'_> {
    fn get_account(&self, address: &Address) -> EvmResult<Option<Account>> {
        // Check cache first
        if let Some(cached) = self.accounts.get(address) {
            return Ok(cached.clone());
        }
        // Fall back to parent
        self.parent.get_account(address)
    }

    fn get_storage(&self, address: &Address, key: &Word) -> EvmResult<Word> {
        if let Some(cached) = self.storage.get(&(*address, *key)) {
            return Ok(*cached);
        }
        if let Some(None) = self.accounts.get(address) {
            return Ok(Word::ZERO);
        }
        self.parent.get_storage(address, key)
    }
}

impl StateWriter for CallFrame<'_> {
    fn update_account(&mut self, account: Account) -> EvmResult<()> {
        self.ensure_writable()?;
        self.ensure_not_removed(&account.address)?;
        self.accounts.insert(account.address, Some(account));
        Ok(())
    }

    fn remove_account(&mut self, address: &Address) -> EvmResult<()> {
        self.ensure_writable()?;
        self.accounts.insert(*address, None);
        self.storage.retain(|(owner, _), _| owner != address);
        Ok(())
    }

    fn set_storage(&mut self, address: Address, key: Word, value: Word) -> EvmResult<()> {
        self.ensure_writable()?;
        self.ensure_not_removed(&address)?;
        self.storage.insert((address, key), value);
        Ok(())
    }
}
