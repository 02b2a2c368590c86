//! Exported state snapshot document

use serde::{Deserialize, Serialize};
use statedump_core::{AccountRecord, Address, Coin, DumpError, DumpResult, Hash, SnapshotMetadata};
use statedump_crypto::{verify_proof, MerkleHasher, MerkleProof};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::leaf::leaf_hash;

/// Per-denom sums over every exported account
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTotals(BTreeMap<String, u128>);

impl AssetTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one coin. Amounts must already be validated as non-negative.
    pub fn add(&mut self, coin: &Coin) -> DumpResult<()> {
        let amount = u128::try_from(coin.amount).map_err(|_| {
            DumpError::Encoding(format!("negative amount {} for {}", coin.amount, coin.denom))
        })?;
        let total = self.0.entry(coin.denom.clone()).or_insert(0);
        *total = total
            .checked_add(amount)
            .ok_or_else(|| DumpError::AssetOverflow(coin.denom.clone()))?;
        Ok(())
    }

    /// Recompute totals from a list of accounts
    pub fn from_accounts<'a>(accounts: impl IntoIterator<Item = &'a AccountRecord>) -> DumpResult<Self> {
        let mut totals = Self::new();
        for account in accounts {
            for coin in &account.coins {
                totals.add(coin)?;
            }
        }
        Ok(totals)
    }

    pub fn get(&self, denom: &str) -> Option<u128> {
        self.0.get(denom).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u128)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A complete state snapshot: metadata, accounts, totals, root, and proofs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub chain_id: String,
    pub block_height: u64,
    pub commit_id: String,
    /// Accounts in leaf order, coins sorted by denom
    pub accounts: Vec<AccountRecord>,
    pub assets: AssetTotals,
    /// `0x` + 64 hex chars
    pub state_root: String,
    /// Sibling hashes per account address, bottom level first
    pub proofs: BTreeMap<String, Vec<String>>,
}

/// Outcome of checking every account of a snapshot against its root
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationReport {
    pub verified: usize,
    /// Addresses whose proof is missing or does not reach the root
    pub failed: Vec<String>,
    /// Whether `assets` matches the sums recomputed from `accounts`
    pub assets_consistent: bool,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.failed.is_empty() && self.assets_consistent
    }
}

impl StateSnapshot {
    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::new(self.chain_id.clone(), self.block_height, self.commit_id.clone())
    }

    /// Parsed state root
    pub fn root(&self) -> DumpResult<Hash> {
        Hash::from_hex(&self.state_root)
            .map_err(|e| DumpError::InvalidHash(format!("{}: {}", self.state_root, e)))
    }

    /// Leaf position of `address`, which is its index in `accounts`
    pub fn leaf_index(&self, address: &Address) -> Option<usize> {
        self.accounts.iter().position(|a| a.address == *address)
    }

    /// Parsed proof for `address`, if the snapshot has one
    pub fn proof_for(&self, address: &Address) -> DumpResult<Option<MerkleProof>> {
        let (Some(siblings), Some(index)) = (
            self.proofs.get(&address.to_prefixed_hex()),
            self.leaf_index(address),
        ) else {
            return Ok(None);
        };
        MerkleProof::from_hex_strings(index, siblings).map(Some)
    }

    /// Check one account against the root. `canonical_pair_order` must match
    /// the tree setting the snapshot was exported with.
    ///
    /// A proof that does not reach the root is `Ok(false)`; only malformed
    /// input is an error.
    pub fn verify_account<H: MerkleHasher>(
        &self,
        hasher: &H,
        account: &AccountRecord,
        canonical_pair_order: bool,
    ) -> DumpResult<bool> {
        let root = self.root()?;
        let Some(proof) = self.proof_for(&account.address)? else {
            return Ok(false);
        };
        let leaf = leaf_hash(hasher, account)?;
        Ok(verify_proof(hasher, &leaf, &proof, &root, canonical_pair_order))
    }

    /// Check every account and the asset totals
    pub fn verify_all<H: MerkleHasher>(
        &self,
        hasher: &H,
        canonical_pair_order: bool,
    ) -> DumpResult<VerificationReport> {
        let mut report = VerificationReport::default();
        for account in &self.accounts {
            if self.verify_account(hasher, account, canonical_pair_order)? {
                report.verified += 1;
            } else {
                report.failed.push(account.address.to_prefixed_hex());
            }
        }
        report.assets_consistent = AssetTotals::from_accounts(&self.accounts)? == self.assets;
        Ok(report)
    }

    pub fn to_json(&self, pretty: bool) -> DumpResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn from_json(json: &str) -> DumpResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> DumpResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Write the document to `path`, replacing any existing file.
    ///
    /// The content goes to a sibling temp file first and is renamed into
    /// place, so readers never see a partial document. The temp file is
    /// removed if any step fails.
    pub fn write_to<P: AsRef<Path>>(&self, path: P, pretty: bool) -> DumpResult<()> {
        let path = path.as_ref();
        let json = self.to_json(pretty)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| DumpError::Io(format!("not a file path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp_path = path.with_file_name(tmp_name);

        let result = write_synced(&tmp_path, json.as_bytes())
            .and_then(|()| std::fs::rename(&tmp_path, path).map_err(DumpError::from));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn write_synced(path: &Path, content: &[u8]) -> DumpResult<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}
