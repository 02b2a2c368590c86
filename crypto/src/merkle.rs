//! Merkle tree construction and inclusion proofs
//!
//! The tree is built once over an ordered list of data blocks and is never
//! mutated afterwards. A leaf is the hash of its block; leaves are padded to
//! the next power of two by repeating the last leaf hash, so every level
//! halves cleanly and every proof has the same length.
//!
//! Hashing within a level runs on a fixed-size rayon pool. Each level is
//! collected by index before the next one starts, so the tree is identical
//! for every worker count.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use statedump_core::{CancelToken, DumpError, DumpResult, Hash, TreeConfig};
use tracing::debug;

use crate::hashing::MerkleHasher;

/// Sibling path from one leaf to the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Position of the leaf in the original block order
    pub leaf_index: usize,
    /// Sibling hashes, bottom level first
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    pub fn new(leaf_index: usize, siblings: Vec<Hash>) -> Self {
        Self {
            leaf_index,
            siblings,
        }
    }

    /// Siblings as `0x`-prefixed lowercase hex strings
    pub fn to_hex_strings(&self) -> Vec<String> {
        self.siblings.iter().map(Hash::to_prefixed_hex).collect()
    }

    /// Parse siblings from their hex form
    pub fn from_hex_strings<S: AsRef<str>>(leaf_index: usize, siblings: &[S]) -> DumpResult<Self> {
        let siblings = siblings
            .iter()
            .map(|s| {
                Hash::from_hex(s.as_ref())
                    .map_err(|e| DumpError::InvalidHash(format!("{}: {}", s.as_ref(), e)))
            })
            .collect::<DumpResult<Vec<_>>>()?;
        Ok(Self::new(leaf_index, siblings))
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// Immutable binary Merkle tree
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Node hashes per level; `levels[0]` is the padded leaf level and the
    /// last level holds only the root
    levels: Vec<Vec<Hash>>,
    leaf_count: usize,
    canonical_pair_order: bool,
}

impl MerkleTree {
    /// Build a tree over `blocks`
    pub fn build<B, H>(blocks: &[B], config: &TreeConfig, hasher: &H) -> DumpResult<Self>
    where
        B: AsRef<[u8]> + Sync,
        H: MerkleHasher,
    {
        Self::build_with_cancel(blocks, config, hasher, &CancelToken::new())
    }

    /// Build a tree over `blocks`, checking `cancel` between levels
    pub fn build_with_cancel<B, H>(
        blocks: &[B],
        config: &TreeConfig,
        hasher: &H,
        cancel: &CancelToken,
    ) -> DumpResult<Self>
    where
        B: AsRef<[u8]> + Sync,
        H: MerkleHasher,
    {
        config.validate()?;
        if blocks.is_empty() {
            return Err(DumpError::EmptyTree);
        }

        let pool = worker_pool(config.parallelism)?;
        let canonical = config.canonical_pair_order;

        let mut leaves = map_blocks(pool.as_ref(), blocks, |block| hasher.hash(block.as_ref()));
        let leaf_count = leaves.len();

        let width = leaf_count.next_power_of_two();
        if let Some(&last) = leaves.last() {
            leaves.resize(width, last);
        }
        debug!(
            "Hashed {} leaves (padded to {}) with {} workers",
            leaf_count, width, config.parallelism
        );

        let mut levels = vec![leaves];
        loop {
            let current = match levels.last() {
                Some(level) if level.len() > 1 => level,
                _ => break,
            };
            if cancel.is_cancelled() {
                return Err(DumpError::Cancelled);
            }
            let next = map_pairs(pool.as_ref(), current, |left, right| {
                hasher.hash_pair(left, right, canonical)
            });
            debug!("Built tree level {} with {} nodes", levels.len(), next.len());
            levels.push(next);
        }

        let tree = Self {
            levels,
            leaf_count,
            canonical_pair_order: canonical,
        };

        if config.verify_after_build {
            tree.check_proofs(pool.as_ref(), hasher)?;
        }

        Ok(tree)
    }

    /// Root hash committing to every leaf
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash::ZERO)
    }

    /// Number of leaves before padding
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of levels above the leaves; also the length of every proof
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn canonical_pair_order(&self) -> bool {
        self.canonical_pair_order
    }

    /// Leaf hash at `index`
    pub fn leaf(&self, index: usize) -> Option<Hash> {
        if index >= self.leaf_count {
            return None;
        }
        self.levels.first().map(|level| level[index])
    }

    /// Leaf hashes in original order, without padding
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0][..self.leaf_count]
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.depth()] {
            siblings.push(level[idx ^ 1]);
            idx >>= 1;
        }

        Some(MerkleProof::new(index, siblings))
    }

    /// Proofs for every original leaf, in leaf order
    pub fn proofs(&self) -> Vec<MerkleProof> {
        (0..self.leaf_count).filter_map(|i| self.proof(i)).collect()
    }

    /// Recompute the root from every stored proof
    fn check_proofs<H: MerkleHasher>(&self, pool: Option<&ThreadPool>, hasher: &H) -> DumpResult<()> {
        let root = self.root();
        let check = |index: usize| -> Option<Hash> {
            let proof = self.proof(index)?;
            let computed = compute_root(hasher, &self.levels[0][index], &proof, self.canonical_pair_order);
            (computed != root).then_some(computed)
        };

        let mismatch = match pool {
            Some(pool) => pool.install(|| (0..self.leaf_count).into_par_iter().find_map_first(check)),
            None => (0..self.leaf_count).find_map(check),
        };

        match mismatch {
            Some(computed) => Err(DumpError::HashMismatch {
                expected: root.to_prefixed_hex(),
                computed: computed.to_prefixed_hex(),
            }),
            None => Ok(()),
        }
    }
}

/// Fold a leaf hash up through its siblings.
///
/// Without canonical ordering, bit `l` of the leaf index tells whether the
/// running hash is the right child at level `l`.
pub fn compute_root<H: MerkleHasher>(
    hasher: &H,
    leaf: &Hash,
    proof: &MerkleProof,
    canonical: bool,
) -> Hash {
    let mut current = *leaf;
    let mut idx = proof.leaf_index;
    for sibling in &proof.siblings {
        current = if !canonical && idx & 1 == 1 {
            hasher.hash_pair(sibling, &current, false)
        } else {
            hasher.hash_pair(&current, sibling, canonical)
        };
        idx >>= 1;
    }
    current
}

/// Check that `proof` links `leaf` to `root`
pub fn verify_proof<H: MerkleHasher>(
    hasher: &H,
    leaf: &Hash,
    proof: &MerkleProof,
    root: &Hash,
    canonical: bool,
) -> bool {
    compute_root(hasher, leaf, proof, canonical) == *root
}

/// Canonical-order verification over a bare sibling list, as exported
pub fn verify_siblings<H: MerkleHasher>(hasher: &H, leaf: &Hash, siblings: &[Hash], root: &Hash) -> bool {
    let current = siblings
        .iter()
        .fold(*leaf, |acc, sibling| hasher.hash_pair(&acc, sibling, true));
    current == *root
}

fn worker_pool(parallelism: usize) -> DumpResult<Option<ThreadPool>> {
    if parallelism <= 1 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .thread_name(|i| format!("merkle-worker-{}", i))
        .build()
        .map(Some)
        .map_err(|e| DumpError::Internal(format!("failed to start hashing pool: {}", e)))
}

fn map_blocks<B, F>(pool: Option<&ThreadPool>, blocks: &[B], f: F) -> Vec<Hash>
where
    B: Sync,
    F: Fn(&B) -> Hash + Sync + Send,
{
    match pool {
        Some(pool) => pool.install(|| blocks.par_iter().map(&f).collect()),
        None => blocks.iter().map(&f).collect(),
    }
}

/// Hash adjacent pairs of `level`; output slot `i` comes from inputs `2i, 2i+1`
fn map_pairs<F>(pool: Option<&ThreadPool>, level: &[Hash], f: F) -> Vec<Hash>
where
    F: Fn(&Hash, &Hash) -> Hash + Sync + Send,
{
    match pool {
        Some(pool) => pool.install(|| {
            level
                .par_chunks_exact(2)
                .map(|pair| f(&pair[0], &pair[1]))
                .collect()
        }),
        None => level
            .chunks_exact(2)
            .map(|pair| f(&pair[0], &pair[1]))
            .collect(),
    }
}
