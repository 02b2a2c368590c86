//! Hashing functions using SHA-256 (with BLAKE3 alternative)

use statedump_core::{Hash, HashAlgorithm, HASH_LENGTH};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
pub fn sha256_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; HASH_LENGTH];
    bytes.copy_from_slice(&result);
    Hash::from_bytes(bytes)
}

/// Compute BLAKE3 hash of data
pub fn blake3_hash(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash::from_bytes(*hash.as_bytes())
}

/// Hash function used for Merkle leaves and internal nodes.
///
/// Implementations must be pure: equal input bytes always give equal hashes.
pub trait MerkleHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> Hash;

    /// Hash two child nodes into their parent.
    ///
    /// With `canonical` set the pair is sorted by byte value first, so the
    /// result does not depend on which child is nominally left. Verifiers
    /// must apply the same rule.
    fn hash_pair(&self, left: &Hash, right: &Hash, canonical: bool) -> Hash {
        let (a, b) = if canonical && right < left {
            (right, left)
        } else {
            (left, right)
        };
        let mut buf = [0u8; 2 * HASH_LENGTH];
        buf[..HASH_LENGTH].copy_from_slice(a.as_bytes());
        buf[HASH_LENGTH..].copy_from_slice(b.as_bytes());
        self.hash(&buf)
    }
}

/// SHA-256 Merkle hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl MerkleHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Hash {
        sha256_hash(data)
    }
}

/// BLAKE3 Merkle hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl MerkleHasher for Blake3Hasher {
    fn hash(&self, data: &[u8]) -> Hash {
        blake3_hash(data)
    }
}

/// Hasher selected at runtime from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfiguredHasher(HashAlgorithm);

impl ConfiguredHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self(algorithm)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.0
    }
}

impl From<HashAlgorithm> for ConfiguredHasher {
    fn from(algorithm: HashAlgorithm) -> Self {
        Self(algorithm)
    }
}

impl MerkleHasher for ConfiguredHasher {
    fn hash(&self, data: &[u8]) -> Hash {
        match self.0 {
            HashAlgorithm::Sha256 => sha256_hash(data),
            HashAlgorithm::Blake3 => blake3_hash(data),
        }
    }
}

/// Deterministic FNV-1a based hasher. Not collision resistant; tests only.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct StubHasher;

#[cfg(any(test, feature = "test-utils"))]
impl MerkleHasher for StubHasher {
    fn hash(&self, data: &[u8]) -> Hash {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut out = [0u8; HASH_LENGTH];
        for (lane, chunk) in out.chunks_mut(8).enumerate() {
            let mut h = OFFSET ^ lane as u64;
            for byte in data {
                h ^= *byte as u64;
                h = h.wrapping_mul(PRIME);
            }
            chunk.copy_from_slice(&h.to_be_bytes());
        }
        Hash::from_bytes(out)
    }
}
