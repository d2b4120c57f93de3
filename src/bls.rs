// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! BLS aggregate signatures over BLS12-381.
//!
//! Public keys live in G1 and signatures in G2. Messages are hashed to G2 with
//! the SSWU map under [`SIGNATURE_DST`]. Aggregation is plain point addition,
//! so an aggregate over the same message verifies exactly like a single
//! signature under the sum of the public keys.

use crate::{
    errors::{InternalError, Result},
    parameters::SIGNATURE_DST,
};
use ark_bls12_381::{
    g2, Bls12_381, Fr as BlsScalar, G1Affine, G1Projective, G2Affine, G2Projective,
};
use ark_ec::{
    hashing::{curve_maps::wb::WBMap, map_to_curve_hasher::MapToCurveBasedHasher, HashToCurve},
    pairing::Pairing,
    AffineRepr, CurveGroup,
};
use ark_ff::{field_hashers::DefaultFieldHasher, One, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt::Debug;

/// Compressed size of a G1 point.
pub const G1_BYTES: usize = 48;
/// Compressed size of a G2 point.
pub const G2_BYTES: usize = 96;

type G2Hasher = MapToCurveBasedHasher<G2Projective, DefaultFieldHasher<Sha256, 128>, WBMap<g2::Config>>;

/// Hash `message` to a point of G2.
pub fn hash_to_g2(message: &[u8]) -> Result<G2Affine> {
    let hasher = G2Hasher::new(SIGNATURE_DST)
        .map_err(|e| InternalError::CurveArithmetic(format!("{e:?}")))?;
    hasher
        .hash(message)
        .map_err(|e| InternalError::CurveArithmetic(format!("{e:?}")))
}

/// A BLS keypair.
#[derive(Clone, PartialEq, Eq)]
pub struct Signer {
    private_key: BlsScalar,
    public_key: G1Affine,
}

impl Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &hex::encode(encode_g1(&self.public_key)))
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Draw a fresh keypair.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut private_key = BlsScalar::rand(rng);
        while private_key.is_zero() {
            private_key = BlsScalar::rand(rng);
        }
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: BlsScalar) -> Self {
        let public_key = (G1Affine::generator() * private_key).into_affine();
        Self {
            private_key,
            public_key,
        }
    }

    /// The public key in G1.
    pub fn public_key(&self) -> &G1Affine {
        &self.public_key
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Result<G2Affine> {
        sign(&self.private_key, message)
    }

    /// Serialized form used for on-disk persistence.
    pub(crate) fn to_keypair_file(&self) -> Result<KeypairFile> {
        let mut private_key = Vec::new();
        self.private_key
            .serialize_compressed(&mut private_key)
            .map_err(|_| InternalError::Serialization)?;
        Ok(KeypairFile {
            private_key: hex::encode(private_key),
            public_key: hex::encode(encode_g1(&self.public_key)),
        })
    }

    pub(crate) fn from_keypair_file(file: &KeypairFile) -> Result<Self> {
        let bytes = decode_hex(&file.private_key)?;
        let private_key = BlsScalar::deserialize_compressed(&bytes[..])?;
        let signer = Self::from_private_key(private_key);
        if hex::encode(encode_g1(&signer.public_key)) != file.public_key.to_lowercase() {
            return Err(InternalError::Deserialization(
                "stored public key does not match the private key".to_string(),
            ));
        }
        Ok(signer)
    }
}

/// On-disk keypair layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeypairFile {
    private_key: String,
    public_key: String,
}

/// Multiply the hash of `message` by `private_key`.
pub fn sign(private_key: &BlsScalar, message: &[u8]) -> Result<G2Affine> {
    Ok((hash_to_g2(message)? * private_key).into_affine())
}

/// Sum public keys and signatures.
///
/// Both lists must be non-empty and of equal length.
pub fn aggregate(public_keys: &[G1Affine], signatures: &[G2Affine]) -> Result<(G1Affine, G2Affine)> {
    if public_keys.is_empty() || public_keys.len() != signatures.len() {
        return arg_err!(format!(
            "cannot aggregate {} public keys with {} signatures",
            public_keys.len(),
            signatures.len()
        ));
    }
    let apk = public_keys
        .iter()
        .fold(G1Projective::zero(), |acc, pk| acc + pk);
    let asig = signatures
        .iter()
        .fold(G2Projective::zero(), |acc, sig| acc + sig);
    Ok((apk.into_affine(), asig.into_affine()))
}

/// Check `e(G1, signature) == e(public_key, H(message))`.
///
/// A signature over a different message is `Ok(false)`.
pub fn verify(public_key: &G1Affine, signature: &G2Affine, message: &[u8]) -> Result<bool> {
    let hashed = hash_to_g2(message)?;
    let product = Bls12_381::multi_pairing(
        [G1Affine::generator(), -*public_key],
        [*signature, hashed],
    );
    Ok(product.0.is_one())
}

/// [`verify`] over encoded points.
pub fn verify_bytes(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<bool> {
    let public_key =
        decode_g1(public_key).map_err(|e| InternalError::CurveArithmetic(e.to_string()))?;
    let signature =
        decode_g2(signature).map_err(|e| InternalError::CurveArithmetic(e.to_string()))?;
    verify(&public_key, &signature, message)
}

/// Compressed encoding of a G1 point.
pub fn encode_g1(point: &G1Affine) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(G1_BYTES);
    // Writing into a Vec cannot fail.
    let _ = point.serialize_compressed(&mut bytes);
    bytes
}

/// Compressed encoding of a G2 point.
pub fn encode_g2(point: &G2Affine) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(G2_BYTES);
    let _ = point.serialize_compressed(&mut bytes);
    bytes
}

/// Decode a compressed G1 point, checking that it lies in the prime-order
/// subgroup.
///
/// Input of the wrong length is a [`InternalError::Deserialization`] error,
/// like any other malformed encoding.
pub fn decode_g1(bytes: &[u8]) -> Result<G1Affine> {
    check_point_length("G1", bytes, G1_BYTES)?;
    Ok(G1Affine::deserialize_compressed(bytes)?)
}

/// Decode a compressed G2 point, checking that it lies in the prime-order
/// subgroup.
pub fn decode_g2(bytes: &[u8]) -> Result<G2Affine> {
    check_point_length("G2", bytes, G2_BYTES)?;
    Ok(G2Affine::deserialize_compressed(bytes)?)
}

fn check_point_length(group: &str, bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(InternalError::Deserialization(format!(
            "a compressed {group} point is {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| InternalError::Deserialization(e.to_string()))
}

/// The aggregate public key and signature persisted by the coordinator once a
/// signing session completes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "AggregateRecordFile", into = "AggregateRecordFile")]
pub struct AggregateRecord {
    /// Sum of the signers' public keys.
    pub public_key: G1Affine,
    /// Sum of the signatures.
    pub signature: G2Affine,
}

impl AggregateRecord {
    /// Verify the record against the message it was produced for.
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        verify(&self.public_key, &self.signature, message)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateRecordFile {
    public_key: String,
    signature: String,
}

impl From<AggregateRecord> for AggregateRecordFile {
    fn from(record: AggregateRecord) -> Self {
        Self {
            public_key: hex::encode(encode_g1(&record.public_key)),
            signature: hex::encode(encode_g2(&record.signature)),
        }
    }
}

impl TryFrom<AggregateRecordFile> for AggregateRecord {
    type Error = InternalError;

    fn try_from(file: AggregateRecordFile) -> Result<Self> {
        Ok(Self {
            public_key: decode_g1(&decode_hex(&file.public_key)?)?,
            signature: decode_g2(&decode_hex(&file.signature)?)?,
        })
    }
}
