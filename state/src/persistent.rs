//! Persistent account store using sled database

use sled::{Db, Tree};
use statedump_core::{
    AccountIter, AccountRecord, AccountStore, Address, DumpError, DumpResult, MetadataProvider,
    SnapshotMetadata,
};
use std::path::Path;

const ACCOUNTS_TREE: &str = "accounts";
const META_TREE: &str = "meta";
const CHAIN_ID_KEY: &[u8] = b"chain_id";
const BLOCK_HEIGHT_KEY: &[u8] = b"block_height";
const COMMIT_ID_KEY: &[u8] = b"commit_id";

fn storage_err(e: sled::Error) -> DumpError {
    DumpError::Storage(e.to_string())
}

/// Account store backed by sled. Accounts are keyed by address bytes, so
/// iteration runs in address order.
pub struct SledAccountStore {
    db: Db,
    accounts: Tree,
    meta: Tree,
}

impl SledAccountStore {
    pub fn open<P: AsRef<Path>>(path: P) -> DumpResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        Self::from_db(db)
    }

    /// Store that lives only as long as the value
    pub fn temporary() -> DumpResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DumpResult<Self> {
        let accounts = db.open_tree(ACCOUNTS_TREE).map_err(storage_err)?;
        let meta = db.open_tree(META_TREE).map_err(storage_err)?;
        Ok(Self { db, accounts, meta })
    }

    /// Insert or replace an account
    pub fn put_account(&self, account: &AccountRecord) -> DumpResult<()> {
        let value = bincode::serialize(account)?;
        self.accounts
            .insert(account.address.as_bytes(), value)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_account(&self, address: &Address) -> DumpResult<Option<AccountRecord>> {
        match self.accounts.get(address.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_metadata(&self, metadata: &SnapshotMetadata) -> DumpResult<()> {
        let mut batch = sled::Batch::default();
        batch.insert(CHAIN_ID_KEY, metadata.chain_id.as_bytes());
        batch.insert(BLOCK_HEIGHT_KEY, &metadata.block_height.to_le_bytes()[..]);
        batch.insert(COMMIT_ID_KEY, metadata.commit_id.as_bytes());
        self.meta.apply_batch(batch).map_err(storage_err)
    }

    pub fn flush(&self) -> DumpResult<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn meta_value(&self, key: &[u8]) -> DumpResult<sled::IVec> {
        self.meta.get(key).map_err(storage_err)?.ok_or_else(|| {
            DumpError::Storage(format!(
                "missing metadata: {}",
                String::from_utf8_lossy(key)
            ))
        })
    }

    fn meta_string(&self, key: &[u8]) -> DumpResult<String> {
        let value = self.meta_value(key)?;
        String::from_utf8(value.to_vec()).map_err(|e| DumpError::Storage(e.to_string()))
    }
}

fn decode_entry(entry: sled::Result<(sled::IVec, sled::IVec)>) -> DumpResult<AccountRecord> {
    let (key, value) = entry.map_err(|e| DumpError::StoreIteration(e.to_string()))?;
    let account: AccountRecord = bincode::deserialize(&value)
        .map_err(|e| DumpError::StoreIteration(format!("corrupt account record: {}", e)))?;
    if account.address.as_bytes()[..] != key[..] {
        return Err(DumpError::StoreIteration(format!(
            "account {} stored under key 0x{}",
            account.address,
            hex::encode(&key)
        )));
    }
    Ok(account)
}

impl AccountStore for SledAccountStore {
    fn accounts(&self) -> DumpResult<AccountIter<'_>> {
        Ok(Box::new(self.accounts.iter().map(decode_entry)))
    }
}

impl MetadataProvider for SledAccountStore {
    fn chain_id(&self) -> DumpResult<String> {
        self.meta_string(CHAIN_ID_KEY)
    }

    fn block_height(&self) -> DumpResult<u64> {
        let value = self.meta_value(BLOCK_HEIGHT_KEY)?;
        let bytes = <[u8; 8]>::try_from(&value[..])
            .map_err(|_| DumpError::Storage("malformed block height".into()))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn commit_id(&self) -> DumpResult<String> {
        self.meta_string(COMMIT_ID_KEY)
    }
}
