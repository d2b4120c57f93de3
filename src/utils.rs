// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    errors::{InternalError, Result},
    parameters::SHARE_LEN,
};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, UniformRand};
use rand::{CryptoRng, RngCore};

/// Encodes a field element as 32 big-endian bytes, left-padded with zeros.
pub(crate) fn fr_to_bytes(element: &Fr) -> [u8; SHARE_LEN] {
    let be = element.into_bigint().to_bytes_be();
    let mut out = [0u8; SHARE_LEN];
    out[SHARE_LEN - be.len()..].copy_from_slice(&be);
    out
}

/// Decodes 32 big-endian bytes, reducing modulo the field order.
pub(crate) fn fr_from_bytes_reduced(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Decodes 32 big-endian bytes, rejecting anything that is not the
/// canonical encoding of a field element (i.e. a value `>= p`).
pub(crate) fn fr_from_canonical_bytes(bytes: &[u8]) -> Result<Fr> {
    if bytes.len() != SHARE_LEN {
        return Err(InternalError::InvalidPayloadLength {
            expected: SHARE_LEN,
            actual: bytes.len(),
        });
    }
    let element = Fr::from_be_bytes_mod_order(bytes);
    if fr_to_bytes(&element) != bytes {
        return Err(InternalError::NonCanonicalFieldElement);
    }
    Ok(element)
}

/// Generate a uniformly random field element.
pub(crate) fn random_fr<R: RngCore + CryptoRng>(rng: &mut R) -> Fr {
    Fr::rand(rng)
}
