//! CLI Commands

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use statedump_core::{
    AccountRecord, AccountStore, Address, DumpConfig, MetadataProvider, SnapshotMetadata,
};
use statedump_crypto::ConfiguredHasher;
use statedump_state::{export_snapshot, ExportContext, SledAccountStore, StateSnapshot, VerificationReport};
use std::path::Path;
use tracing::{info, warn};

/// Account list plus chain metadata, loadable into a store with `import`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisFile {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub accounts: Vec<AccountRecord>,
}

impl GenesisFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Open the sled account store at `db`
pub fn open_store(db: &Path) -> anyhow::Result<SledAccountStore> {
    SledAccountStore::open(db).with_context(|| format!("opening account store at {}", db.display()))
}

/// Export `store` and write the snapshot to `output`
pub fn export_to_file<S>(store: &S, output: &Path, config: &DumpConfig) -> anyhow::Result<StateSnapshot>
where
    S: AccountStore + MetadataProvider,
{
    if output.as_os_str().is_empty() {
        bail!("<path/state.json> should be set");
    }
    config.validate()?;

    let metadata = store.metadata().context("reading snapshot metadata")?;

    let ctx = ExportContext::from_config(metadata, config);
    let snapshot = export_snapshot(&ctx, store).context("exporting state")?;

    snapshot
        .write_to(output, config.pretty)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        "Wrote snapshot of {} accounts to {}",
        snapshot.accounts.len(),
        output.display()
    );

    Ok(snapshot)
}

/// Check a snapshot file. With `address`, only that account is checked.
pub fn verify_file(
    path: &Path,
    address: Option<&str>,
    config: &DumpConfig,
) -> anyhow::Result<VerificationReport> {
    let snapshot = StateSnapshot::load(path).with_context(|| format!("loading {}", path.display()))?;
    let hasher = ConfiguredHasher::new(config.hash_algorithm);
    let canonical = config.tree.canonical_pair_order;

    let Some(address) = address else {
        return Ok(snapshot.verify_all(&hasher, canonical)?);
    };

    let address = Address::from_hex(address).with_context(|| format!("invalid address {}", address))?;
    let account = snapshot
        .accounts
        .iter()
        .find(|a| a.address == address)
        .with_context(|| format!("account {} is not in the snapshot", address))?;

    let mut report = VerificationReport {
        assets_consistent: true,
        ..Default::default()
    };
    if snapshot.verify_account(&hasher, account, canonical)? {
        report.verified = 1;
    } else {
        report.failed.push(address.to_prefixed_hex());
    }
    Ok(report)
}

/// Load a genesis file into `store`. Returns the number of accounts written.
pub fn import_genesis(genesis: &Path, store: &SledAccountStore) -> anyhow::Result<usize> {
    let genesis = GenesisFile::load(genesis)?;

    if !store.is_empty() {
        warn!(
            "Account store already holds {} accounts; imported accounts are merged",
            store.len()
        );
    }

    for account in &genesis.accounts {
        store.put_account(account)?;
    }
    store.set_metadata(&genesis.metadata)?;
    store.flush()?;

    info!(
        "Imported {} accounts for {} at height {}",
        genesis.accounts.len(),
        genesis.metadata.chain_id,
        genesis.metadata.block_height
    );
    Ok(genesis.accounts.len())
}
