// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Inputs for a succinct proof of inclusion under a signed root.
//!
//! The relation proven is: hashing `leaf` up the tree along `path`, with the
//! side of each sibling given by `directions`, yields the public `root`, and
//! the public validity bit is set. The validity bit is the result of checking
//! the aggregate signature against `root`.
//!
//! Proof systems plug in through [`SuccinctProver`]. [`TransparentProver`]
//! reveals the private inputs and checks the relation natively.

use crate::{
    bls::AggregateRecord,
    errors::{InternalError, Result},
    merkle::{fold_path, leaf_digest, proof_directions, LeafMode, MerkleProof},
    mimc::TreeHasher,
    parameters::SHARE_LEN,
    utils::fr_from_canonical_bytes,
};
use ark_bn254::Fr;
use ark_ff::{One, Zero};
use tracing::{instrument, warn};

/// Inputs known to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputs {
    /// Whether the aggregate signature over `root` verified.
    pub valid: bool,
    /// The signed Merkle root.
    pub root: Vec<u8>,
}

/// Inputs known only to the prover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateInputs {
    /// The proven leaf as it was recorded in the proof.
    pub leaf: Vec<u8>,
    /// Sibling digests from the bottom of the tree up.
    pub path: Vec<Vec<u8>>,
    /// `true` where the sibling is the left child.
    pub directions: Vec<bool>,
}

/// Public and private inputs of one attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationInputs {
    /// How `leaf` becomes its height-0 digest.
    pub mode: LeafMode,
    /// What the verifier sees.
    pub public: PublicInputs,
    /// What the prover keeps.
    pub private: PrivateInputs,
}

impl AttestationInputs {
    /// Package an inclusion proof and the aggregate signature of its root.
    #[instrument(skip_all, err(Debug))]
    pub fn from_proof(
        mode: LeafMode,
        proof: &MerkleProof,
        record: &AggregateRecord,
    ) -> Result<Self> {
        let (leaf, path) = proof.proof_set.split_first().ok_or_else(|| {
            InternalError::InvalidArgument("the proof does not contain a leaf".to_string())
        })?;
        let directions = proof_directions(proof.proof_index, proof.num_leaves, path.len())
            .ok_or_else(|| {
                InternalError::InvalidArgument(format!(
                    "a path of {} siblings does not fit leaf {} of {}",
                    path.len(),
                    proof.proof_index,
                    proof.num_leaves
                ))
            })?;
        let valid = record.verify(&proof.root)?;
        if !valid {
            warn!("The aggregate signature does not cover this root");
        }
        Ok(Self {
            mode,
            public: PublicInputs {
                valid,
                root: proof.root.clone(),
            },
            private: PrivateInputs {
                leaf: leaf.clone(),
                path: path.to_vec(),
                directions,
            },
        })
    }

    /// Evaluate the relation.
    pub fn is_satisfied<H: TreeHasher>(&self, hasher: &H) -> Result<bool> {
        if !self.public.valid {
            return Ok(false);
        }
        let digest = leaf_digest(hasher, self.mode, &self.private.leaf)?;
        let root = fold_path(
            hasher,
            &digest,
            &self.private.path,
            &self.private.directions,
        )?;
        Ok(root == self.public.root)
    }

    /// Public inputs as field elements: `[valid, root]`.
    pub fn public_field_inputs(&self) -> Result<Vec<Fr>> {
        let valid = if self.public.valid {
            Fr::one()
        } else {
            Fr::zero()
        };
        Ok(vec![valid, fr_from_canonical_bytes(&self.public.root)?])
    }

    /// Private inputs as field elements: the leaf's 32-byte words, then the
    /// path, then one 0/1 element per direction.
    pub fn private_field_inputs(&self) -> Result<Vec<Fr>> {
        if self.private.leaf.is_empty() || self.private.leaf.len() % SHARE_LEN != 0 {
            return Err(InternalError::InvalidPayloadLength {
                expected: SHARE_LEN,
                actual: self.private.leaf.len(),
            });
        }
        let mut inputs = self
            .private
            .leaf
            .chunks(SHARE_LEN)
            .map(fr_from_canonical_bytes)
            .collect::<Result<Vec<_>>>()?;
        for sibling in &self.private.path {
            inputs.push(fr_from_canonical_bytes(sibling)?);
        }
        inputs.extend(
            self.private
                .directions
                .iter()
                .map(|left| if *left { Fr::one() } else { Fr::zero() }),
        );
        Ok(inputs)
    }
}

/// An external succinct proof system for the attestation relation.
pub trait SuccinctProver {
    /// The proof object.
    type Proof;

    /// Prove knowledge of private inputs satisfying the relation.
    fn prove(&self, inputs: &AttestationInputs) -> Result<Self::Proof>;

    /// Check a proof against the public inputs.
    fn verify(&self, public: &PublicInputs, proof: &Self::Proof) -> Result<bool>;
}

/// A prover whose proof is the private inputs themselves.
///
/// Offers no privacy; useful for exercising the relation end to end.
#[derive(Debug, Clone)]
pub struct TransparentProver<H: TreeHasher> {
    hasher: H,
    mode: LeafMode,
}

impl<H: TreeHasher> TransparentProver<H> {
    /// A prover over trees built with `hasher` in `mode`.
    pub fn new(hasher: H, mode: LeafMode) -> Self {
        Self { hasher, mode }
    }
}

impl<H: TreeHasher> SuccinctProver for TransparentProver<H> {
    type Proof = PrivateInputs;

    fn prove(&self, inputs: &AttestationInputs) -> Result<Self::Proof> {
        if inputs.mode != self.mode || !inputs.is_satisfied(&self.hasher)? {
            return Err(InternalError::InvalidArgument(
                "the inputs do not satisfy the relation".to_string(),
            ));
        }
        Ok(inputs.private.clone())
    }

    fn verify(&self, public: &PublicInputs, proof: &Self::Proof) -> Result<bool> {
        AttestationInputs {
            mode: self.mode,
            public: public.clone(),
            private: proof.clone(),
        }
        .is_satisfied(&self.hasher)
    }
}
