//! Core traits defining STATEDUMP interfaces
//!
//! These traits are the seams to the ledger that owns the accounts.

use crate::types::*;

/// Result type for STATEDUMP operations
pub type DumpResult<T> = Result<T, crate::error::DumpError>;

/// Lazy, finite sequence of accounts. An `Err` item is terminal.
pub type AccountIter<'a> = Box<dyn Iterator<Item = DumpResult<AccountRecord>> + 'a>;

/// Source of the accounts to export
pub trait AccountStore: Send + Sync {
    /// Iterate accounts in a stable order for the current snapshot point
    fn accounts(&self) -> DumpResult<AccountIter<'_>>;
}

/// Read-only chain metadata valid at export time
pub trait MetadataProvider {
    fn chain_id(&self) -> DumpResult<String>;

    fn block_height(&self) -> DumpResult<u64>;

    fn commit_id(&self) -> DumpResult<String>;

    /// Collect all three fields
    fn metadata(&self) -> DumpResult<SnapshotMetadata> {
        Ok(SnapshotMetadata {
            chain_id: self.chain_id()?,
            block_height: self.block_height()?,
            commit_id: self.commit_id()?,
        })
    }
}

impl MetadataProvider for SnapshotMetadata {
    fn chain_id(&self) -> DumpResult<String> {
        Ok(self.chain_id.clone())
    }

    fn block_height(&self) -> DumpResult<u64> {
        Ok(self.block_height)
    }

    fn commit_id(&self) -> DumpResult<String> {
        Ok(self.commit_id.clone())
    }
}
