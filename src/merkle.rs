// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Incremental Merkle accumulator.
//!
//! The [`Tree`] is kept as a stack of complete subtrees of strictly
//! decreasing height, so a tree over 11 leaves is held as subtrees of height
//! 3, 1 and 0. A push adds a height-0 subtree and merges equal heights from
//! the top of the stack. Memory is logarithmic in the number of leaves.
//!
//! One leaf index can be designated with [`Tree::set_index`] before the first
//! insertion; the sibling digests needed to prove that leaf are then collected
//! while the tree is built, and [`Tree::prove`] completes them into a full
//! inclusion proof, which [`verify_proof`] checks.
//!
//! In [`LeafMode::Reconstruct`] leaves are 64-byte joint payloads stored
//! verbatim. When two leaves merge, their halves are added in the field
//! ([`combine_leaf_pair`]) and the two sums become the children that are
//! hashed into the parent.

use crate::{
    errors::{InternalError, Result},
    mimc::TreeHasher,
    sharing::{combine_leaf_pair, validate_joint_payload},
};
use tracing::{instrument, trace};

/// How a pushed payload becomes a height-0 subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafMode {
    /// The payload is kept verbatim, and sibling leaves are reconstructed by
    /// field addition before they are hashed.
    Reconstruct,
    /// The leaf digest is the hash of the payload.
    Hash,
}

#[derive(Debug, Clone)]
struct SubTree {
    height: usize,
    sum: Vec<u8>,
}

/// An inclusion proof produced by [`Tree::prove`].
///
/// `proof_set[0]` is the proven leaf, the remaining entries are sibling
/// digests from the bottom of the tree to the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Root of the tree the proof was taken from.
    pub root: Vec<u8>,
    /// The leaf followed by its sibling path.
    pub proof_set: Vec<Vec<u8>>,
    /// Position of the proven leaf.
    pub proof_index: u64,
    /// Number of leaves in the tree.
    pub num_leaves: u64,
}

impl MerkleProof {
    /// Sibling digests, excluding the leaf itself.
    pub fn path(&self) -> &[Vec<u8>] {
        self.proof_set.get(1..).unwrap_or(&[])
    }
}

/// A Merkle accumulator over a [`TreeHasher`].
#[derive(Debug, Clone)]
pub struct Tree<H: TreeHasher> {
    hasher: H,
    mode: LeafMode,
    /// The last element is the smallest subtree.
    stack: Vec<SubTree>,
    current_index: u64,
    proof_index: u64,
    proof_set: Vec<Vec<u8>>,
    proof_tree: bool,
    /// Leaves as they entered the hash chain, for [`Tree::build_proof`].
    leaves: Vec<Vec<u8>>,
}

impl<H: TreeHasher> Tree<H> {
    /// A tree in [`LeafMode::Reconstruct`].
    pub fn new(hasher: H) -> Self {
        Self::with_mode(hasher, LeafMode::Reconstruct)
    }

    /// A tree in [`LeafMode::Hash`].
    pub fn new_hashed(hasher: H) -> Self {
        Self::with_mode(hasher, LeafMode::Hash)
    }

    /// An empty tree in `mode`.
    pub fn with_mode(hasher: H, mode: LeafMode) -> Self {
        Self {
            hasher,
            mode,
            stack: Vec::new(),
            current_index: 0,
            proof_index: 0,
            proof_set: Vec::new(),
            proof_tree: false,
            leaves: Vec::new(),
        }
    }

    /// How leaves enter the tree.
    pub fn mode(&self) -> LeafMode {
        self.mode
    }

    /// Number of leaves inserted so far, counting every leaf of a pushed
    /// subtree.
    pub fn num_leaves(&self) -> u64 {
        self.current_index
    }

    /// Whether no leaf has been pushed.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Enable proof mode for leaf `index`.
    ///
    /// Only allowed before the first insertion.
    pub fn set_index(&mut self, index: u64) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(InternalError::ProofModeLocked);
        }
        self.proof_tree = true;
        self.proof_index = index;
        Ok(())
    }

    /// Append a leaf.
    ///
    /// In [`LeafMode::Reconstruct`] the payload must be exactly two canonical
    /// field elements.
    pub fn push(&mut self, payload: &[u8]) -> Result<()> {
        let sum = match self.mode {
            LeafMode::Reconstruct => validate_joint_payload(payload)?.to_vec(),
            LeafMode::Hash => {
                let digest = self.hasher.sum(&[payload])?;
                self.leaves.push(payload.to_vec());
                digest
            }
        };

        if self.proof_tree && self.current_index == self.proof_index {
            self.proof_set.push(payload.to_vec());
        }

        self.stack.push(SubTree { height: 0, sum });
        self.join_all_subtrees()?;
        self.current_index += 1;
        Ok(())
    }

    /// Append a precomputed complete subtree of `2^height` leaves.
    ///
    /// The subtree may not be taller than the current smallest subtree and
    /// may not cover the leaf being proven. Its balance is not checked.
    pub fn push_subtree(&mut self, height: usize, sum: &[u8]) -> Result<()> {
        let width = 1u64
            .checked_shl(height as u32)
            .filter(|_| height < 64)
            .ok_or(InternalError::SubtreeTooLarge {
                height,
                smallest: self.stack.last().map_or(0, |s| s.height),
            })?;
        let new_index = self.current_index + width;
        if self.proof_tree
            && (self.current_index == self.proof_index
                || (self.current_index < self.proof_index && self.proof_index < new_index))
        {
            return Err(InternalError::SubtreeContainsProofIndex);
        }
        if let Some(head) = self.stack.last() {
            if height > head.height {
                return Err(InternalError::SubtreeTooLarge {
                    height,
                    smallest: head.height,
                });
            }
        }
        if height == 0 && self.mode == LeafMode::Reconstruct {
            validate_joint_payload(sum)?;
        }

        self.stack.push(SubTree {
            height,
            sum: sum.to_vec(),
        });
        self.join_all_subtrees()?;
        self.current_index = new_index;
        Ok(())
    }

    /// The Merkle root, or `None` if nothing has been inserted.
    ///
    /// Remaining subtrees are folded from the smallest upwards, the taller
    /// subtree always being the left child. The tree is not modified.
    pub fn root(&self) -> Result<Option<Vec<u8>>> {
        let mut subtrees = self.stack.iter().rev();
        let mut current = match subtrees.next() {
            Some(head) => head.sum.clone(),
            None => return Ok(None),
        };
        for older in subtrees {
            current = self.hasher.sum(&[&older.sum[..], &current[..]])?;
        }
        Ok(Some(current))
    }

    /// Produce the inclusion proof for the leaf chosen with
    /// [`Tree::set_index`].
    ///
    /// If that leaf has not been inserted yet the returned proof set is
    /// empty.
    #[instrument(skip_all, err(Debug))]
    pub fn prove(&self) -> Result<MerkleProof> {
        if !self.proof_tree {
            return Err(InternalError::ProofModeDisabled);
        }
        let root = self.root()?.ok_or(InternalError::EmptyAccumulator)?;
        let mut proof_set = self.proof_set.clone();
        if proof_set.is_empty() {
            return Ok(MerkleProof {
                root,
                proof_set,
                proof_index: self.proof_index,
                num_leaves: self.current_index,
            });
        }

        // The subtree holding the proof index has height `proof_set.len() - 1`.
        // Everything smaller collapses into one right sibling; everything
        // taller becomes a left sibling.
        let target_height = proof_set.len() - 1;
        let mut i = self.stack.len() - 1;
        let mut current = self.stack[i].sum.clone();
        while i > 0 && self.stack[i - 1].height < target_height {
            current = self.hasher.sum(&[&self.stack[i - 1].sum[..], &current[..]])?;
            i -= 1;
        }
        if i > 0 && self.stack[i - 1].height == target_height {
            proof_set.push(current);
            i -= 1;
        }
        while i > 0 {
            i -= 1;
            proof_set.push(self.stack[i].sum.clone());
        }
        trace!(entries = proof_set.len(), "Completed proof set.");

        Ok(MerkleProof {
            root,
            proof_set,
            proof_index: self.proof_index,
            num_leaves: self.current_index,
        })
    }

    /// Rebuild the tree level by level from the retained leaves and return
    /// the path for leaf `index` together with the resulting root.
    ///
    /// Every retained leaf is hashed first; a level with an odd number of
    /// nodes pairs its last node with itself. In [`LeafMode::Reconstruct`]
    /// only leaves that have already been reconstructed are retained.
    pub fn build_proof(&self, index: u64) -> Result<(Vec<Vec<u8>>, Vec<u8>)> {
        let index = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.leaves.len())
            .ok_or_else(|| {
                InternalError::InvalidArgument(format!(
                    "leaf index {index} out of range for {} retained leaves",
                    self.leaves.len()
                ))
            })?;

        let mut nodes = self
            .leaves
            .iter()
            .map(|leaf| self.hasher.sum(&[&leaf[..]]))
            .collect::<Result<Vec<_>>>()?;
        let mut proof = Vec::new();
        let mut i = index;
        while nodes.len() > 1 {
            let mut next_level = Vec::with_capacity((nodes.len() + 1) / 2);
            for (pair_index, pair) in nodes.chunks(2).enumerate() {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                if i == 2 * pair_index {
                    proof.push(right.clone());
                } else if i == 2 * pair_index + 1 {
                    proof.push(left.clone());
                }
                next_level.push(self.hasher.sum(&[&left[..], &right[..]])?);
            }
            i /= 2;
            nodes = next_level;
        }
        let root = nodes.pop().ok_or(InternalError::InternalInvariantFailed)?;
        Ok((proof, root))
    }

    fn join_all_subtrees(&mut self) -> Result<()> {
        while self.stack.len() >= 2 {
            let n = self.stack.len();
            let (older, head) = (&self.stack[n - 2], &self.stack[n - 1]);
            if older.height != head.height {
                break;
            }
            let height = head.height;
            let reconstructing = height == 0 && self.mode == LeafMode::Reconstruct;

            let (left, right) = if reconstructing {
                let (a, b) = combine_leaf_pair(&older.sum, &head.sum)?;
                (a.to_vec(), b.to_vec())
            } else {
                (older.sum.clone(), head.sum.clone())
            };
            let parent = self.hasher.sum(&[&left[..], &right[..]])?;

            if self.proof_tree && !self.proof_set.is_empty() && height == self.proof_set.len() - 1
            {
                let width = 1u64 << height;
                let mid = (self.current_index / width) * width;
                let (own, sibling) = if self.proof_index < mid {
                    (&left, &right)
                } else {
                    (&right, &left)
                };
                if reconstructing {
                    self.proof_set[0] = own.clone();
                }
                self.proof_set.push(sibling.clone());
            }
            if reconstructing {
                self.leaves.push(left);
                self.leaves.push(right);
            }

            self.stack.truncate(n - 2);
            self.stack.push(SubTree {
                height: height + 1,
                sum: parent,
            });
        }
        Ok(())
    }
}

/// Side of each sibling on the path of leaf `proof_index` in a tree of
/// `num_leaves` leaves, for a path of `path_len` siblings.
///
/// `true` means the sibling is the left child, i.e. the running digest is
/// hashed as `H(sibling || digest)`. Returns `None` if the index is out of
/// range or the path is too short for the tree shape.
pub fn proof_directions(proof_index: u64, num_leaves: u64, path_len: usize) -> Option<Vec<bool>> {
    if proof_index >= num_leaves {
        return None;
    }
    let mut directions = Vec::with_capacity(path_len);
    let mut height = 1u32;
    let mut stable_end = proof_index;

    // Complete subtrees containing the leaf.
    while height < 64 {
        let width = 1u64 << height;
        let start = (proof_index / width) * width;
        let end = start + width - 1;
        if end >= num_leaves {
            break;
        }
        stable_end = end;
        if directions.len() == path_len {
            return None;
        }
        directions.push(proof_index - start >= width / 2);
        height += 1;
    }

    // An orphaned aggregate of smaller subtrees sits to the right.
    if stable_end != num_leaves - 1 {
        if directions.len() == path_len {
            return None;
        }
        directions.push(false);
    }

    // Everything else is a taller subtree to the left.
    directions.resize(path_len, true);
    Some(directions)
}

/// Hash `leaf_digest` up the tree along `path`.
pub fn fold_path<H: TreeHasher>(
    hasher: &H,
    leaf_digest: &[u8],
    path: &[Vec<u8>],
    directions: &[bool],
) -> Result<Vec<u8>> {
    if path.len() != directions.len() {
        return Err(InternalError::InvalidArgument(format!(
            "path has {} entries but {} directions",
            path.len(),
            directions.len()
        )));
    }
    let mut digest = leaf_digest.to_vec();
    for (sibling, sibling_is_left) in path.iter().zip(directions) {
        digest = if *sibling_is_left {
            hasher.sum(&[&sibling[..], &digest[..]])?
        } else {
            hasher.sum(&[&digest[..], &sibling[..]])?
        };
    }
    Ok(digest)
}

/// The digest a leaf contributes at height 0.
pub fn leaf_digest<H: TreeHasher>(hasher: &H, mode: LeafMode, leaf: &[u8]) -> Result<Vec<u8>> {
    match mode {
        LeafMode::Reconstruct => Ok(leaf.to_vec()),
        LeafMode::Hash => hasher.sum(&[leaf]),
    }
}

/// Check that `proof_set` proves leaf `proof_index` under `root`.
///
/// Returns `Ok(false)` for any malformed or non-matching proof; errors are
/// only raised by the hash function itself.
pub fn verify_proof<H: TreeHasher>(
    hasher: &H,
    mode: LeafMode,
    root: &[u8],
    proof_set: &[Vec<u8>],
    proof_index: u64,
    num_leaves: u64,
) -> Result<bool> {
    let (leaf, path) = match proof_set.split_first() {
        Some(parts) => parts,
        None => return Ok(false),
    };
    let directions = match proof_directions(proof_index, num_leaves, path.len()) {
        Some(directions) => directions,
        None => return Ok(false),
    };
    let digest = match leaf_digest(hasher, mode, leaf) {
        Ok(digest) => digest,
        Err(_) => return Ok(false),
    };
    match fold_path(hasher, &digest, path, &directions) {
        Ok(computed) => Ok(computed == root),
        Err(InternalError::NonCanonicalFieldElement)
        | Err(InternalError::InvalidPayloadLength { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
