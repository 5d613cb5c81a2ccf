//! Merkle tree over an ordered list of chunk digests.
//!
//! Leaf order is file order and is never sorted; reassembly depends on the
//! sequence being preserved. The manifest stores the full node array (leaves
//! first, root last), so verification recomputes the whole array, not just
//! the root.
//!
//! Conventions: an internal node is `keccak256(left || right)`; an odd node
//! at the end of a level is promoted unchanged to the next level; the root of
//! a single-leaf tree is that leaf's digest itself. Build and verify apply
//! the same conventions, which is what makes round trips at the chunk-size
//! boundary work.

use crate::hashing::{keccak256_concat, ContentDigest};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MerkleError {
    #[error("cannot build a merkle tree over zero leaves")]
    EmptyLeaves,
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// Build the full node array for the given leaves: every level concatenated,
/// leaves first, root last.
pub fn build_tree(leaves: &[ContentDigest]) -> MerkleResult<Vec<ContentDigest>> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }

    let mut nodes: Vec<ContentDigest> = leaves.to_vec();
    let mut level: Vec<ContentDigest> = leaves.to_vec();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(keccak256_concat(&[&pair[0], &pair[1]]));
            } else {
                // Odd trailing node is promoted unchanged
                next.push(pair[0]);
            }
        }
        nodes.extend_from_slice(&next);
        level = next;
    }

    Ok(nodes)
}

/// Compute just the root for the given leaves.
pub fn root(leaves: &[ContentDigest]) -> MerkleResult<ContentDigest> {
    let nodes = build_tree(leaves)?;
    Ok(*nodes.last().unwrap_or(&[0u8; 32]))
}

/// Recompute the root and compare against an expected value.
pub fn verify_root(leaves: &[ContentDigest], expected: &ContentDigest) -> bool {
    match root(leaves) {
        Ok(computed) => computed == *expected,
        Err(_) => false,
    }
}

/// Recompute the full node array and compare element-wise against the array
/// recorded in a manifest.
pub fn verify_nodes(leaves: &[ContentDigest], expected: &[ContentDigest]) -> bool {
    match build_tree(leaves) {
        Ok(computed) => computed == expected,
        Err(_) => false,
    }
}
