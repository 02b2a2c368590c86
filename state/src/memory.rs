//! In-memory account store for testing and imports

use parking_lot::RwLock;
use statedump_core::{AccountIter, AccountRecord, AccountStore, DumpResult};

/// In-memory account store. Iterates in insertion order.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<AccountRecord>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub fn insert(&self, account: AccountRecord) {
        self.accounts.write().push(account);
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

impl Clone for MemoryAccountStore {
    fn clone(&self) -> Self {
        Self::with_accounts(self.accounts.read().clone())
    }
}

impl AccountStore for MemoryAccountStore {
    fn accounts(&self) -> DumpResult<AccountIter<'_>> {
        // Copy under the lock so later inserts never show up mid-export
        let snapshot = self.accounts.read().clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}
