//! Merkle-committed state export
//!
//! Accounts are read from the store in the order it yields them, encoded into
//! leaves, and committed under a single root. The export is all-or-nothing:
//! any failure from the store, the encoder, or the tree aborts it.

use statedump_core::{
    AccountStore, CancelToken, DumpConfig, DumpError, DumpResult, SnapshotMetadata, TreeConfig,
};
use statedump_crypto::{ConfiguredHasher, MerkleHasher, MerkleTree};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::leaf::encode_leaf;
use crate::snapshot::{AssetTotals, StateSnapshot};

/// Everything one export needs, passed explicitly
#[derive(Debug, Clone)]
pub struct ExportContext<H> {
    pub metadata: SnapshotMetadata,
    pub tree: TreeConfig,
    pub hasher: H,
    pub cancel: CancelToken,
}

impl<H: MerkleHasher> ExportContext<H> {
    pub fn new(metadata: SnapshotMetadata, hasher: H) -> Self {
        Self {
            metadata,
            tree: TreeConfig::default(),
            hasher,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_tree_config(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl ExportContext<ConfiguredHasher> {
    /// Context using the tree settings and hash function from `config`
    pub fn from_config(metadata: SnapshotMetadata, config: &DumpConfig) -> Self {
        Self::new(metadata, ConfiguredHasher::new(config.hash_algorithm)).with_tree_config(config.tree)
    }
}

/// Export every account of `store` into a snapshot
pub fn export_snapshot<H: MerkleHasher>(
    ctx: &ExportContext<H>,
    store: &dyn AccountStore,
) -> DumpResult<StateSnapshot> {
    info!(
        "Exporting state of {} at height {}",
        ctx.metadata.chain_id, ctx.metadata.block_height
    );

    let mut accounts = Vec::new();
    let mut leaves = Vec::new();
    let mut assets = AssetTotals::new();
    let mut seen = HashSet::new();

    for item in store.accounts()? {
        let record = item?;
        if ctx.cancel.is_cancelled() {
            return Err(DumpError::Cancelled);
        }
        if !seen.insert(record.address) {
            return Err(DumpError::DuplicateAccount(record.address.to_prefixed_hex()));
        }

        let leaf = encode_leaf(&record)?;
        for coin in &leaf.account.coins {
            assets.add(coin)?;
        }
        accounts.push(leaf.account);
        leaves.push(leaf.bytes);
    }
    debug!("Collected {} accounts across {} denoms", accounts.len(), assets.len());

    let tree = MerkleTree::build_with_cancel(&leaves, &ctx.tree, &ctx.hasher, &ctx.cancel)?;

    let proofs: BTreeMap<String, Vec<String>> = accounts
        .iter()
        .zip(tree.proofs())
        .map(|(account, proof)| (account.address.to_prefixed_hex(), proof.to_hex_strings()))
        .collect();

    let state_root = tree.root().to_prefixed_hex();
    info!("State root {} over {} accounts", state_root, accounts.len());

    Ok(StateSnapshot {
        chain_id: ctx.metadata.chain_id.clone(),
        block_height: ctx.metadata.block_height,
        commit_id: ctx.metadata.commit_id.clone(),
        accounts,
        assets,
        state_root,
        proofs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::{encode_account, leaf_hash};
    use crate::memory::MemoryAccountStore;
    use crate::persistent::SledAccountStore;
    use statedump_core::{AccountIter, AccountRecord, Address, Coin, Hash, ADDRESS_LENGTH};
    use statedump_crypto::{sha256_hash, Sha256Hasher, StubHasher};

    fn addr(byte: u8) -> Address {
        Address([byte; ADDRESS_LENGTH])
    }

    fn metadata() -> SnapshotMetadata {
        SnapshotMetadata::new("Binance-Chain-Tigris", 1024, "7f3a")
    }

    fn sample_accounts(n: usize) -> Vec<AccountRecord> {
        (0..n)
            .map(|i| {
                let mut coins = vec![Coin::new("BNB", 1_000 + i as i64)];
                if i % 3 == 0 {
                    coins.push(Coin::new("ATOM", i as i64));
                }
                AccountRecord::new(addr(i as u8), i as u64, coins)
            })
            .collect()
    }

    struct FailingStore {
        good: usize,
    }

    impl AccountStore for FailingStore {
        fn accounts(&self) -> DumpResult<AccountIter<'_>> {
            let good = sample_accounts(self.good).into_iter().map(Ok);
            let bad = std::iter::once(Err(DumpError::StoreIteration("disk read failed".into())));
            Ok(Box::new(good.chain(bad)))
        }
    }

    #[test]
    fn test_worked_example() {
        let aa = AccountRecord::new(addr(0xaa), 1, vec![Coin::new("ATOM", 10)]);
        let bb = AccountRecord::new(addr(0xbb), 2, vec![Coin::new("ATOM", 5)]);
        let store = MemoryAccountStore::with_accounts(vec![aa.clone(), bb.clone()]);

        let ctx = ExportContext::new(metadata(), Sha256Hasher);
        let snapshot = export_snapshot(&ctx, &store).unwrap();

        let l_aa = sha256_hash(&encode_account(&aa).unwrap());
        let l_bb = sha256_hash(&encode_account(&bb).unwrap());
        let (lo, hi) = if l_aa < l_bb { (l_aa, l_bb) } else { (l_bb, l_aa) };
        let mut concat = lo.as_bytes().to_vec();
        concat.extend_from_slice(hi.as_bytes());

        assert_eq!(snapshot.state_root, sha256_hash(&concat).to_prefixed_hex());
        assert_eq!(snapshot.proofs[&aa.address.to_prefixed_hex()], vec![l_bb.to_prefixed_hex()]);
        assert_eq!(snapshot.proofs[&bb.address.to_prefixed_hex()], vec![l_aa.to_prefixed_hex()]);
        assert_eq!(snapshot.assets.get("ATOM"), Some(15));
        assert_eq!(snapshot.assets.len(), 1);
        assert_eq!(snapshot.metadata(), metadata());
    }

    #[test]
    fn test_every_account_verifies() {
        let store = MemoryAccountStore::with_accounts(sample_accounts(11));
        let ctx = ExportContext::new(metadata(), Sha256Hasher);
        let snapshot = export_snapshot(&ctx, &store).unwrap();

        let report = snapshot.verify_all(&Sha256Hasher, true).unwrap();
        assert_eq!(report.verified, 11);
        assert!(report.is_valid());
        assert_eq!(snapshot.proofs.len(), 11);
    }

    #[test]
    fn test_asset_sum_invariant() {
        let accounts = sample_accounts(20);
        let store = MemoryAccountStore::with_accounts(accounts.clone());
        let snapshot = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();

        for (denom, total) in snapshot.assets.iter() {
            let expected: i128 = accounts.iter().map(|a| a.amount_of(denom)).sum();
            assert_eq!(*total as i128, expected, "total for {}", denom);
        }
    }

    #[test]
    fn test_deterministic_across_worker_counts() {
        let store = MemoryAccountStore::with_accounts(sample_accounts(25));
        let base = export_snapshot(
            &ExportContext::new(metadata(), Sha256Hasher).with_tree_config(TreeConfig::sequential()),
            &store,
        )
        .unwrap();

        for workers in [2, 4, 7] {
            let ctx = ExportContext::new(metadata(), Sha256Hasher)
                .with_tree_config(TreeConfig::default().with_parallelism(workers));
            let snapshot = export_snapshot(&ctx, &store).unwrap();
            assert_eq!(snapshot, base);
            assert_eq!(snapshot.to_json(true).unwrap(), base.to_json(true).unwrap());
        }
    }

    #[test]
    fn test_single_account() {
        let account = AccountRecord::new(addr(1), 0, vec![Coin::new("BNB", 42)]);
        let store = MemoryAccountStore::with_accounts(vec![account.clone()]);
        let snapshot = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();

        let leaf = leaf_hash(&Sha256Hasher, &account).unwrap();
        assert_eq!(snapshot.state_root, leaf.to_prefixed_hex());
        assert!(snapshot.proofs[&account.address.to_prefixed_hex()].is_empty());
        assert!(snapshot.verify_account(&Sha256Hasher, &account, true).unwrap());
    }

    #[test]
    fn test_empty_store_fails() {
        let store = MemoryAccountStore::new();
        let err = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap_err();
        assert!(matches!(err, DumpError::EmptyTree));
    }

    #[test]
    fn test_store_error_aborts() {
        let store = FailingStore { good: 3 };
        let err = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap_err();
        assert!(matches!(err, DumpError::StoreIteration(msg) if msg == "disk read failed"));
    }

    #[test]
    fn test_encoding_error_aborts() {
        let mut accounts = sample_accounts(4);
        accounts[2].coins.push(Coin::new("ATOM", -5));
        let store = MemoryAccountStore::with_accounts(accounts);

        let err = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap_err();
        assert!(matches!(err, DumpError::Encoding(_)));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut accounts = sample_accounts(3);
        accounts.push(accounts[1].clone());
        let store = MemoryAccountStore::with_accounts(accounts);

        let err = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap_err();
        assert!(matches!(err, DumpError::DuplicateAccount(_)));
    }

    #[test]
    fn test_cancelled_export() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExportContext::new(metadata(), Sha256Hasher).with_cancel(cancel);
        let store = MemoryAccountStore::with_accounts(sample_accounts(4));

        assert!(matches!(export_snapshot(&ctx, &store), Err(DumpError::Cancelled)));
    }

    #[test]
    fn test_single_account_change_changes_root() {
        let accounts = sample_accounts(10);
        let ctx = ExportContext::new(metadata(), StubHasher);
        let base = export_snapshot(&ctx, &MemoryAccountStore::with_accounts(accounts.clone()))
            .unwrap()
            .state_root;

        for i in 0..accounts.len() {
            let mut altered = accounts.clone();
            altered[i].coins[0].amount += 1;
            let root = export_snapshot(&ctx, &MemoryAccountStore::with_accounts(altered))
                .unwrap()
                .state_root;
            assert_ne!(root, base, "changing account {} kept the root", i);
        }
    }

    #[test]
    fn test_tampered_account_fails_verification() {
        let store = MemoryAccountStore::with_accounts(sample_accounts(6));
        let snapshot = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();

        let mut tampered = snapshot.clone();
        tampered.accounts[3].coins[0].amount += 1;
        let report = tampered.verify_all(&Sha256Hasher, true).unwrap();

        assert_eq!(report.verified, 5);
        assert_eq!(report.failed, vec![addr(3).to_prefixed_hex()]);
        assert!(!report.assets_consistent);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_json_shape() {
        let store = MemoryAccountStore::with_accounts(sample_accounts(3));
        let snapshot = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();
        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json(false).unwrap()).unwrap();

        assert_eq!(value["chain_id"], "Binance-Chain-Tigris");
        assert_eq!(value["block_height"], 1024);
        assert_eq!(value["commit_id"], "7f3a");
        assert_eq!(value["accounts"][0]["address"], addr(0).to_prefixed_hex());
        assert_eq!(value["accounts"][0]["coins"][0]["denom"], "ATOM");
        assert_eq!(value["assets"]["BNB"], 3003);

        let root = value["state_root"].as_str().unwrap();
        assert!(root.starts_with("0x") && root.len() == 66);
        assert!(Hash::from_hex(root).is_ok());

        let proof = value["proofs"][addr(1).to_prefixed_hex()].as_array().unwrap();
        assert_eq!(proof.len(), 2);
        assert!(proof.iter().all(|s| s.as_str().unwrap().len() == 66));
    }

    #[test]
    fn test_sled_store_export() {
        let store = SledAccountStore::temporary().unwrap();
        for account in sample_accounts(5).into_iter().rev() {
            store.put_account(&account).unwrap();
        }

        let snapshot = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();
        let addresses: Vec<Address> = snapshot.accounts.iter().map(|a| a.address).collect();
        assert_eq!(addresses, (0..5u8).map(addr).collect::<Vec<_>>());
        assert!(snapshot.verify_all(&Sha256Hasher, true).unwrap().is_valid());
    }

    #[test]
    fn test_from_config_uses_algorithm() {
        let config = DumpConfig {
            hash_algorithm: statedump_core::HashAlgorithm::Blake3,
            ..DumpConfig::default()
        };
        let store = MemoryAccountStore::with_accounts(sample_accounts(3));

        let blake = export_snapshot(&ExportContext::from_config(metadata(), &config), &store).unwrap();
        let sha = export_snapshot(&ExportContext::new(metadata(), Sha256Hasher), &store).unwrap();

        assert_ne!(blake.state_root, sha.state_root);
        let hasher = ConfiguredHasher::new(config.hash_algorithm);
        assert!(blake
            .verify_all(&hasher, config.tree.canonical_pair_order)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn test_positional_order_export_verifies() {
        let tree = TreeConfig {
            canonical_pair_order: false,
            ..TreeConfig::default()
        };
        let store = MemoryAccountStore::with_accounts(sample_accounts(5));
        let ctx = ExportContext::new(metadata(), Sha256Hasher).with_tree_config(tree);
        let snapshot = export_snapshot(&ctx, &store).unwrap();

        let report = snapshot.verify_all(&Sha256Hasher, false).unwrap();
        assert_eq!(report.verified, 5);
        assert!(report.is_valid());

        let account = snapshot.accounts[2].clone();
        assert!(snapshot.verify_account(&Sha256Hasher, &account, false).unwrap());
        assert_eq!(snapshot.proof_for(&account.address).unwrap().unwrap().leaf_index, 2);
    }
}
