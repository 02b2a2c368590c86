//! Error types for STATEDUMP

use thiserror::Error;

/// Main error type for STATEDUMP
#[derive(Error, Debug)]
pub enum DumpError {
    // ============ Export Errors ============
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Cannot build a Merkle tree without leaves")]
    EmptyTree,

    #[error("Account store iteration failed: {0}")]
    StoreIteration(String),

    #[error("Duplicate account in store: {0}")]
    DuplicateAccount(String),

    #[error("Asset total overflow for denom {0}")]
    AssetOverflow(String),

    #[error("Merkle root mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("Export cancelled")]
    Cancelled,

    // ============ Parsing Errors ============
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    // ============ IO Errors ============
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for DumpError {
    fn from(err: std::io::Error) -> Self {
        DumpError::Io(err.to_string())
    }
}

impl From<bincode::Error> for DumpError {
    fn from(err: bincode::Error) -> Self {
        DumpError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(err: serde_json::Error) -> Self {
        DumpError::Serialization(err.to_string())
    }
}
