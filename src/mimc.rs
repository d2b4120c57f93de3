// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Hash functions used by the accumulator and the attribute commitment.
//!
//! [`MiMC`] is the MiMC-BN254 sponge in Miyaguchi–Preneel mode: the input is
//! read as a sequence of canonical 32-byte field elements, each element is
//! encrypted under the running state with the `x^5` round function, and the
//! result is folded back into the state. The same function is evaluated by
//! the attestation circuit.
//!
//! [`Sha256Hasher`] is a byte-oriented alternative for callers that never
//! need in-circuit verification.

use crate::{
    errors::{InternalError, Result},
    parameters::{MIMC_ROUNDS, MIMC_SEED, SHARE_LEN},
    utils::{fr_from_bytes_reduced, fr_from_canonical_bytes, fr_to_bytes},
};
use ark_bn254::Fr;
use ark_ff::{Field, Zero};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

lazy_static! {
    static ref MIMC_CONSTANTS: Vec<Fr> = derive_round_constants();
}

/// Round constants are a Keccak-256 hash chain over the seed; the seed's own
/// hash is skipped.
fn derive_round_constants() -> Vec<Fr> {
    let mut rnd = Keccak256::digest(MIMC_SEED).to_vec();
    let mut constants = Vec::with_capacity(MIMC_ROUNDS);
    for _ in 0..MIMC_ROUNDS {
        rnd = Keccak256::digest(&rnd).to_vec();
        constants.push(fr_from_bytes_reduced(&rnd));
    }
    constants
}

/// A hash function that the Merkle accumulator can be instantiated with.
///
/// `sum` hashes the concatenation of `parts`; each part is written to the
/// underlying hash separately, which matters for [`MiMC`] where short parts are
/// padded individually.
pub trait TreeHasher: Clone + Send + Sync {
    /// Hash the given parts into a digest.
    fn sum(&self, parts: &[&[u8]]) -> Result<Vec<u8>>;
}

/// MiMC-BN254 with 110 rounds and exponent 5.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiMC;

impl MiMC {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self
    }

    /// Hash a sequence of field elements, returning the final state.
    pub fn hash_elements(&self, elements: &[Fr]) -> Fr {
        let mut h = Fr::zero();
        for m in elements {
            let r = encrypt(*m, h);
            h += r + m;
        }
        h
    }

    /// Split `data` into field elements.
    ///
    /// Inputs shorter than one block are left-padded to 32 bytes. Longer
    /// inputs must consist of whole blocks.
    fn absorb(data: &[u8], out: &mut Vec<Fr>) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() < SHARE_LEN {
            let mut block = [0u8; SHARE_LEN];
            block[SHARE_LEN - data.len()..].copy_from_slice(data);
            out.push(fr_from_canonical_bytes(&block)?);
            return Ok(());
        }
        if data.len() % SHARE_LEN != 0 {
            return Err(InternalError::InvalidPayloadLength {
                expected: (data.len() / SHARE_LEN + 1) * SHARE_LEN,
                actual: data.len(),
            });
        }
        for block in data.chunks(SHARE_LEN) {
            out.push(fr_from_canonical_bytes(block)?);
        }
        Ok(())
    }
}

fn encrypt(mut m: Fr, key: Fr) -> Fr {
    for c in MIMC_CONSTANTS.iter() {
        let tmp = m + key + c;
        m = tmp.square().square() * tmp;
    }
    m + key
}

impl TreeHasher for MiMC {
    fn sum(&self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut elements = Vec::with_capacity(parts.len());
        for part in parts {
            Self::absorb(part, &mut elements)?;
        }
        Ok(fr_to_bytes(&self.hash_elements(&elements)).to_vec())
    }
}

/// SHA-256 over the concatenated parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl TreeHasher for Sha256Hasher {
    fn sum(&self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Ok(hasher.finalize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::random_fr;
    use rand::rngs::OsRng;

    #[test]
    fn test_round_constants_are_deterministic() {
        assert_eq!(MIMC_CONSTANTS.len(), MIMC_ROUNDS);
        assert_eq!(*MIMC_CONSTANTS, derive_round_constants());
        assert_ne!(MIMC_CONSTANTS[0], MIMC_CONSTANTS[1]);
    }

    #[test]
    fn test_short_input_is_left_padded() -> Result<()> {
        let h = MiMC::new();
        let mut padded = [0u8; SHARE_LEN];
        padded[SHARE_LEN - 5..].copy_from_slice(b"hello");
        assert_eq!(h.sum(&[&b"hello"[..]])?, h.sum(&[&padded[..]])?);
        Ok(())
    }

    #[test]
    fn test_parts_match_element_hash() -> Result<()> {
        let mut rng = OsRng;
        let h = MiMC::new();
        let a = random_fr(&mut rng);
        let b = random_fr(&mut rng);
        let by_parts = h.sum(&[&fr_to_bytes(&a)[..], &fr_to_bytes(&b)[..]])?;
        let joined = [fr_to_bytes(&a), fr_to_bytes(&b)].concat();
        assert_eq!(by_parts, h.sum(&[&joined[..]])?);
        assert_eq!(by_parts, fr_to_bytes(&h.hash_elements(&[a, b])).to_vec());
        // Order matters.
        assert_ne!(by_parts, h.sum(&[&fr_to_bytes(&b)[..], &fr_to_bytes(&a)[..]])?);
        Ok(())
    }

    #[test]
    fn test_malformed_blocks_are_rejected() {
        let h = MiMC::new();
        assert!(matches!(
            h.sum(&[&[1u8; 40][..]]),
            Err(InternalError::InvalidPayloadLength { actual: 40, .. })
        ));
        assert_eq!(
            h.sum(&[&[0xffu8; SHARE_LEN][..]]),
            Err(InternalError::NonCanonicalFieldElement)
        );
    }

    #[test]
    fn test_empty_input_hashes_to_zero() -> Result<()> {
        assert_eq!(MiMC::new().sum(&[])?, vec![0u8; SHARE_LEN]);
        Ok(())
    }

    #[test]
    fn test_sha256_is_concatenation() -> Result<()> {
        let h = Sha256Hasher;
        assert_eq!(h.sum(&[&b"ab"[..], &b"cd"[..]])?, h.sum(&[&b"abcd"[..]])?);
        assert_eq!(h.sum(&[&b"abcd"[..]])?, Sha256::digest(b"abcd").to_vec());
        Ok(())
    }
}
