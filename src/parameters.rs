// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Protocol parameter definitions.
//!
//! Shares, commitments and accumulator digests live in the scalar field of
//! BN254, encoded as 32 big-endian bytes. Signatures are BLS over BLS12-381
//! with public keys in G1 and signatures in G2 ("minimal public key size"
//! variant), hashed to the curve with the ciphersuite tag of \[1\].
//!
//! ## References
//! 1. BLS Signatures, draft-irtf-cfrg-bls-signature-05, Section 4.2.1.

use std::time::Duration;

/// Byte length of a single share or field element.
pub const SHARE_LEN: usize = 32;

/// Byte length of a reconstructed payload submitted to the coordinator: two
/// concatenated shares.
pub const JOINT_PAYLOAD_LEN: usize = 2 * SHARE_LEN;

/// Number of participants a session waits for unless configured otherwise.
pub const DEFAULT_EXPECTED_PARTICIPANTS: usize = 4;

/// Group identifier used when a request does not name one.
pub const DEFAULT_GROUP: u64 = 42;

/// Upper bound on the participant-to-participant share exchange.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Upper bound on a blocking coordinator call.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Number of rounds of the MiMC permutation over BN254.
pub(crate) const MIMC_ROUNDS: usize = 110;

/// Seed from which the MiMC round constants are derived.
pub(crate) const MIMC_SEED: &[u8] = b"seed";

/// Domain separation tag for hashing messages to G2.
pub const SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";
