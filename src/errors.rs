// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced during an execution of the protocol
use core::fmt::Debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, InternalError>;

/// Represents an error raised by the coordinator, a participant, or the
/// underlying field, curve and accumulator arithmetic.
///
/// The type is `Clone` so that a single session outcome can be handed to every
/// waiter of a barrier session.
#[derive(Clone, Eq, PartialEq, Error, Debug, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("Serialization Error")]
    Serialization,
    #[error("Failed to deserialize input: `{0}`")]
    Deserialization(String),
    #[error("The caller's deadline expired before the operation completed")]
    Cancelled,
    #[error("The share exchange with the paired peer did not complete in time")]
    SessionTimeout,
    #[error("The paired peer closed the exchange channel")]
    PeerDisconnected,
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidPayloadLength { expected: usize, actual: usize },
    #[error("Byte string is not the canonical encoding of a field element")]
    NonCanonicalFieldElement,
    #[error("Curve arithmetic failed: `{0}`")]
    CurveArithmetic(String),
    #[error("Aggregate signature does not verify against the group's Merkle root")]
    AggregateVerificationFailed,
    #[error("No Merkle root has been published for group {0}")]
    UnknownGroupRoot(u64),
    #[error("Cannot produce a proof: proof mode was not enabled before the first insertion")]
    ProofModeDisabled,
    #[error("Proof mode can only be enabled on an empty accumulator")]
    ProofModeLocked,
    #[error("Cannot push a subtree of height {height} onto a smallest subtree of height {smallest}")]
    SubtreeTooLarge { height: usize, smallest: usize },
    #[error("A precomputed subtree cannot cover the leaf being proven")]
    SubtreeContainsProofIndex,
    #[error("The accumulator is empty")]
    EmptyAccumulator,
    #[error("Storage does not contain the requested item")]
    StorageItemNotFound,
    #[error("Storage error: `{0}`")]
    Storage(String),
    #[error("Invalid configuration: `{0}`")]
    Config(String),
    #[error("Function call contained invalid arguments: `{0}`")]
    InvalidArgument(String),
    #[error("Represents some code assumption that was checked at runtime but failed to be true")]
    InternalInvariantFailed,
}

impl From<std::io::Error> for InternalError {
    fn from(err: std::io::Error) -> Self {
        InternalError::Storage(err.to_string())
    }
}

impl From<ark_serialize::SerializationError> for InternalError {
    fn from(err: ark_serialize::SerializationError) -> Self {
        InternalError::Deserialization(err.to_string())
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x)
            .map_err(|e| crate::errors::InternalError::Deserialization(e.to_string()))
    }};
}

macro_rules! arg_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::InvalidArgument(String::from(
            $x,
        )))
    }};
}
