//! STATEDUMP CLI - Command Line Interface

use clap::{Parser, Subcommand};
use statedump_cli::{export_to_file, import_genesis, open_store, verify_file};
use statedump_core::{DumpConfig, HashAlgorithm};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "statedump")]
#[command(about = "STATEDUMP - Merkle-committed ledger state export")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export state to JSON
    Export {
        /// Output file, replaced if it exists
        #[arg(value_name = "path/state.json")]
        output: PathBuf,

        /// Account store directory
        #[arg(long, default_value = "./data")]
        db: PathBuf,

        /// Hashing worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Hash function (sha256 or blake3)
        #[arg(long)]
        hash: Option<HashAlgorithm>,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        /// Skip recomputing the root from every proof
        #[arg(long)]
        no_self_check: bool,
    },

    /// Check every proof of an exported snapshot
    Verify {
        /// Snapshot file
        snapshot: PathBuf,

        /// Only check this address
        #[arg(short, long)]
        address: Option<String>,

        /// Hash function the snapshot was built with
        #[arg(long)]
        hash: Option<HashAlgorithm>,
    },

    /// Load accounts and metadata from a genesis JSON file into the store
    Import {
        /// Genesis file
        genesis: PathBuf,

        /// Account store directory
        #[arg(long, default_value = "./data")]
        db: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DumpConfig::load(path)?,
        None => DumpConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Export {
            output,
            db,
            workers,
            hash,
            compact,
            no_self_check,
        } => {
            if let Some(workers) = workers {
                config.tree.parallelism = workers;
            }
            if let Some(hash) = hash {
                config.hash_algorithm = hash;
            }
            if compact {
                config.pretty = false;
            }
            if no_self_check {
                config.tree.verify_after_build = false;
            }

            let store = open_store(&db)?;
            let snapshot = export_to_file(&store, &output, &config)?;

            println!("State root: {}", snapshot.state_root);
            println!("Accounts:   {}", snapshot.accounts.len());
            println!("Saved to:   {}", output.display());
        }

        Commands::Verify {
            snapshot,
            address,
            hash,
        } => {
            if let Some(hash) = hash {
                config.hash_algorithm = hash;
            }

            let report = verify_file(&snapshot, address.as_deref(), &config)?;

            println!("Verified: {}", report.verified);
            for failed in &report.failed {
                println!("FAILED:   {}", failed);
            }
            if !report.assets_consistent {
                println!("Asset totals do not match the account list");
            }
            if !report.is_valid() {
                std::process::exit(1);
            }
        }

        Commands::Import { genesis, db } => {
            let store = open_store(&db)?;
            let count = import_genesis(&genesis, &store)?;
            println!("Imported {} accounts into {}", count, db.display());
        }
    }

    Ok(())
}
