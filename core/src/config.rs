//! Configuration types for STATEDUMP

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::DumpError;
use crate::traits::DumpResult;

/// Main export configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Logging level
    pub log_level: String,

    /// Merkle tree configuration
    pub tree: TreeConfig,

    /// Hash function for leaves and internal nodes
    pub hash_algorithm: HashAlgorithm,

    /// Write indented JSON
    pub pretty: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tree: TreeConfig::default(),
            hash_algorithm: HashAlgorithm::default(),
            pretty: true,
        }
    }
}

impl DumpConfig {
    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> DumpResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> DumpResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DumpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DumpResult<()> {
        self.tree.validate()
    }
}

/// Merkle tree construction configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Worker threads used for hashing; 1 hashes inline
    pub parallelism: usize,

    /// Sort each sibling pair by byte value before hashing
    pub canonical_pair_order: bool,

    /// Recompute the root from every proof after construction
    pub verify_after_build: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            canonical_pair_order: true,
            verify_after_build: true,
        }
    }
}

impl TreeConfig {
    /// Single-threaded configuration with the default pair order
    pub fn sequential() -> Self {
        Self {
            parallelism: 1,
            ..Default::default()
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn validate(&self) -> DumpResult<()> {
        if self.parallelism == 0 {
            return Err(DumpError::Config("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}

/// Supported hash functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl FromStr for HashAlgorithm {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(DumpError::Config(format!("unknown hash algorithm: {}", other))),
        }
    }
}
