//! STATEDUMP Cryptography Module
//!
//! Provides the hashing primitives and the Merkle commitment:
//! - SHA-256 (default) and BLAKE3 behind the `MerkleHasher` seam
//! - Parallel, level-synchronized Merkle tree construction
//! - Inclusion proof extraction and verification

pub mod hashing;
pub mod merkle;

pub use hashing::*;
pub use merkle::*;
