// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paired secret reconstruction, Merkle accumulation and aggregate BLS
//! attestation.
//!
//! Participants register with a [`Coordinator`], which pairs them in arrival
//! order. Each member of a pair commits to an attribute as a BN254 field
//! element, splits it additively, and exchanges one share with its peer.
//! Both then submit a 64-byte joint payload to the coordinator's result
//! session for their group. Once the expected number of payloads has
//! arrived, the coordinator folds them into a MiMC Merkle [`Tree`] whose
//! leaf-pair merge adds the two payloads of a pair in the field, and every
//! participant receives the root.
//!
//! Each participant then signs the root with BLS over BLS12-381. The
//! coordinator aggregates the signatures and public keys by point addition,
//! verifies the aggregate with a pairing check and persists it. A
//! participant can finally turn an inclusion proof for its leaf and the
//! aggregate signature into [`attestation`] inputs for a succinct proof
//! system.
//!
//! This library does not provide a network transport. The coordinator's
//! RPC surface is the [`CoordinatorApi`] trait and the peer link is pluggable
//! through the traits in [`exchange`]; [`MemoryNetwork`] connects
//! participants within one process. For an HTTP deployment take a look at
//! the network demo under `demos/network`.

#![warn(missing_docs)]

#[macro_use]
pub mod errors;

pub mod attestation;
pub mod bls;
pub mod config;
pub mod coordinator;
pub mod exchange;
pub mod merkle;
pub mod messages;
pub mod mimc;
pub mod parameters;
pub mod participant;
pub mod sharing;
pub mod storage;
mod utils;

pub use bls::{AggregateRecord, Signer};
pub use config::{CoordinatorConfig, ParticipantSettings};
pub use coordinator::{Coordinator, CoordinatorApi};
pub use errors::InternalError;
pub use exchange::MemoryNetwork;
pub use merkle::{LeafMode, MerkleProof, Tree};
pub use mimc::{MiMC, Sha256Hasher, TreeHasher};
pub use participant::{Participant, ParticipantOutcome};

#[cfg(test)]
mod tests;
