// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Additive secret sharing of attribute commitments.
//!
//! Each participant commits to its attribute as a BN254 field element `X`,
//! splits it into `X = retained + outgoing`, and sends `outgoing` to its paired
//! peer. Each side then submits a 64-byte joint payload made of its retained
//! share and the share it received, with the odd-sequence member's material
//! always in the first half. When the accumulator later merges the two
//! payloads of a pair ([`combine_leaf_pair`]), adding them position-wise
//! recovers both attribute commitments.

use crate::{
    errors::{InternalError, Result},
    mimc::{MiMC, TreeHasher},
    parameters::{JOINT_PAYLOAD_LEN, SHARE_LEN},
    utils::{fr_from_bytes_reduced, fr_from_canonical_bytes, fr_to_bytes, random_fr},
};
use ark_bn254::Fr;
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;

/// A 32-byte encoded share.
pub type ShareBytes = [u8; SHARE_LEN];

/// A 64-byte reconstruction payload.
pub type JointPayload = [u8; JOINT_PAYLOAD_LEN];

/// Commit to an attribute by hashing its bytes to a field element.
///
/// Attributes of up to 32 bytes are always accepted; longer attributes must
/// be a whole number of canonical 32-byte blocks.
pub fn commit(attribute: &str) -> Result<Fr> {
    let digest = MiMC::new().sum(&[attribute.as_bytes()])?;
    fr_from_canonical_bytes(&digest)
}

/// The two additive shares of a committed value.
#[derive(Clone, PartialEq, Eq)]
pub struct ShareSplit {
    retained: Fr,
    outgoing: Fr,
}

impl Debug for ShareSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSplit").finish_non_exhaustive()
    }
}

impl ShareSplit {
    /// The share kept locally.
    pub fn retained(&self) -> ShareBytes {
        fr_to_bytes(&self.retained)
    }

    /// The share sent to the paired peer.
    pub fn outgoing(&self) -> ShareBytes {
        fr_to_bytes(&self.outgoing)
    }

    /// Recombine both shares.
    pub fn value(&self) -> Fr {
        self.retained + self.outgoing
    }
}

/// Split `x` into a uniformly random share and its complement.
pub fn split<R: RngCore + CryptoRng>(x: &Fr, rng: &mut R) -> ShareSplit {
    let retained = random_fr(rng);
    ShareSplit {
        retained,
        outgoing: *x - retained,
    }
}

/// Whether `sequence` is the first number of its pairing.
///
/// Pairings hand out `(2k + 1, 2k + 2)`, so the odd member comes first.
pub fn is_first_of_pair(sequence: i32) -> bool {
    sequence & 1 == 1
}

/// Build the joint payload from the local and received shares.
///
/// The share of the odd sequence number is always placed first, so both
/// members of a pairing agree on which half carries whose share.
pub fn reconstruct(local: &ShareBytes, peer: &ShareBytes, local_sequence: i32) -> JointPayload {
    let (first, second) = if is_first_of_pair(local_sequence) {
        (local, peer)
    } else {
        (peer, local)
    };
    let mut joint = [0u8; JOINT_PAYLOAD_LEN];
    joint[..SHARE_LEN].copy_from_slice(first);
    joint[SHARE_LEN..].copy_from_slice(second);
    joint
}

/// Check that a payload is exactly two canonical field elements.
pub fn validate_joint_payload(payload: &[u8]) -> Result<JointPayload> {
    let joint: JointPayload =
        payload
            .try_into()
            .map_err(|_| InternalError::InvalidPayloadLength {
                expected: JOINT_PAYLOAD_LEN,
                actual: payload.len(),
            })?;
    fr_from_canonical_bytes(&joint[..SHARE_LEN])?;
    fr_from_canonical_bytes(&joint[SHARE_LEN..])?;
    Ok(joint)
}

/// Add two joint payloads position-wise.
///
/// Returns `(a_first + b_first, a_second + b_second)`, each as 32 bytes.
/// This is where the two members of a pairing reveal their committed values:
/// the first components sum to the odd member's commitment and the second
/// components to the even member's.
pub fn combine_leaf_pair(a: &[u8], b: &[u8]) -> Result<(ShareBytes, ShareBytes)> {
    for payload in [a, b] {
        if payload.len() != JOINT_PAYLOAD_LEN {
            return Err(InternalError::InvalidPayloadLength {
                expected: JOINT_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
    }
    let first = fr_from_bytes_reduced(&a[..SHARE_LEN]) + fr_from_bytes_reduced(&b[..SHARE_LEN]);
    let second = fr_from_bytes_reduced(&a[SHARE_LEN..]) + fr_from_bytes_reduced(&b[SHARE_LEN..]);
    Ok((fr_to_bytes(&first), fr_to_bytes(&second)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_split_recombines() -> Result<()> {
        let mut rng = OsRng;
        for attribute in ["18", "gamma", "hello", "world", ""] {
            let x = commit(attribute)?;
            for _ in 0..20 {
                let shares = split(&x, &mut rng);
                assert_eq!(shares.value(), x);
                let sum = fr_from_canonical_bytes(&shares.retained())?
                    + fr_from_canonical_bytes(&shares.outgoing())?;
                assert_eq!(sum, x);
            }
        }
        Ok(())
    }

    #[test]
    fn test_splits_are_randomized() -> Result<()> {
        let mut rng = OsRng;
        let x = commit("gamma")?;
        assert_ne!(split(&x, &mut rng), split(&x, &mut rng));
        Ok(())
    }

    #[test]
    fn test_commit_is_deterministic() -> Result<()> {
        assert_eq!(commit("18")?, commit("18")?);
        assert_ne!(commit("18")?, commit("19")?);
        Ok(())
    }

    #[test]
    fn test_long_attribute_must_be_whole_blocks() {
        let attribute = "a".repeat(40);
        assert!(matches!(
            commit(&attribute),
            Err(InternalError::InvalidPayloadLength { .. })
        ));
    }

    #[test]
    fn test_both_sides_reconstruct_same_payload() {
        let s5 = [5u8; SHARE_LEN];
        let s6 = [6u8; SHARE_LEN];
        let odd_side = reconstruct(&s5, &s6, 5);
        let even_side = reconstruct(&s6, &s5, 6);
        assert_eq!(odd_side, even_side);
        assert_eq!(odd_side[..SHARE_LEN], s5);
        assert_eq!(odd_side[SHARE_LEN..], s6);

        // Negative sequence numbers keep the same parity rule.
        assert!(is_first_of_pair(-3));
        assert!(!is_first_of_pair(-2));
    }

    #[test]
    fn test_pair_reveals_commitments() -> Result<()> {
        let mut rng = OsRng;
        let x = commit("alice")?;
        let y = commit("bob")?;
        let alice = split(&x, &mut rng);
        let bob = split(&y, &mut rng);

        // Alice holds sequence 1, Bob holds sequence 2.
        let from_alice = reconstruct(&alice.retained(), &bob.outgoing(), 1);
        let from_bob = reconstruct(&bob.retained(), &alice.outgoing(), 2);
        assert_eq!(from_alice[..SHARE_LEN], alice.retained());
        assert_eq!(from_bob[..SHARE_LEN], alice.outgoing());

        let (first, second) = combine_leaf_pair(&from_alice, &from_bob)?;
        assert_eq!(fr_from_canonical_bytes(&first)?, x);
        assert_eq!(fr_from_canonical_bytes(&second)?, y);
        Ok(())
    }

    #[test]
    fn test_payload_validation() {
        assert_eq!(
            validate_joint_payload(&[0u8; 63]),
            Err(InternalError::InvalidPayloadLength {
                expected: JOINT_PAYLOAD_LEN,
                actual: 63
            })
        );
        assert_eq!(
            validate_joint_payload(&[0xffu8; JOINT_PAYLOAD_LEN]),
            Err(InternalError::NonCanonicalFieldElement)
        );
        assert!(validate_joint_payload(&[1u8; JOINT_PAYLOAD_LEN]).is_ok());
    }
}
