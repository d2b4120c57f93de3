// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Request and response types exchanged with the coordinator and between
//! paired participants.
//!
//! All types serialize with `bincode` through [`WireMessage`]; any transport
//! that can move byte strings can carry them.

use crate::errors::{InternalError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use tracing::{error, trace};

/// A type that travels over the wire as a bincode blob.
pub trait WireMessage: Serialize + DeserializeOwned + Debug {
    /// Encode the message.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        trace!("Encoding wire message.");
        serialize!(self)
    }

    /// Decode a message, failing with [`InternalError::Deserialization`] on
    /// malformed input.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes).map_err(|e: InternalError| {
            error!("Failed to decode a {}", std::any::type_name::<Self>());
            e
        })
    }
}

/// `Register`: announce the address at which this participant accepts the
/// share exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Where the peer should send its share.
    pub address: String,
}

/// Reply to [`RegisterRequest`] once the caller has been paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResponse {
    /// Exchange address of the paired peer.
    pub peer_address: String,
    /// The sequence number assigned to the caller.
    pub peer_sequence: i32,
}

/// The single message each side of a pairing sends to the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMessage {
    /// The sender's sequence number.
    pub sequence: i32,
    /// The sender's outgoing share.
    pub payload: Vec<u8>,
}

/// `SubmitResult`: a reconstructed 64-byte joint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRequest {
    /// The sequence number assigned at pairing.
    pub sequence: i32,
    /// The joint payload.
    pub result_data: Vec<u8>,
    /// The coordinator's default group is used when unset.
    #[serde(default)]
    pub group: Option<u64>,
}

/// Reply to [`ResultRequest`]: the group's Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultResponse {
    /// The Merkle root over every payload of the group.
    pub processed_data: Vec<u8>,
}

/// `SubmitSignature`: a signature over the group's Merkle root and the signing
/// public key, both compressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// The signature, in G2.
    pub signed_message: Vec<u8>,
    /// The signer's public key, in G1.
    pub public_key: Vec<u8>,
    /// The coordinator's default group is used when unset.
    #[serde(default)]
    pub group: Option<u64>,
}

/// Reply to [`SignRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// The compressed aggregate signature.
    pub aggregate_result: Vec<u8>,
    /// The root that was signed.
    pub merkle_root: Vec<u8>,
}

/// Error reply carried by transports that need one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: InternalError,
}

impl WireMessage for RegisterRequest {}
impl WireMessage for MatchResponse {}
impl WireMessage for ShareMessage {}
impl WireMessage for ResultRequest {}
impl WireMessage for ResultResponse {}
impl WireMessage for SignRequest {}
impl WireMessage for SignResponse {}
impl WireMessage for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_survive_the_wire() -> Result<()> {
        let request = ResultRequest {
            sequence: 3,
            result_data: vec![7u8; 64],
            group: Some(9),
        };
        assert_eq!(ResultRequest::from_bytes(&request.to_bytes()?)?, request);

        let error = ErrorResponse {
            error: InternalError::InvalidPayloadLength {
                expected: 64,
                actual: 3,
            },
        };
        assert_eq!(ErrorResponse::from_bytes(&error.to_bytes()?)?, error);
        Ok(())
    }

    #[test]
    fn test_malformed_bytes_are_rejected() {
        assert!(matches!(
            SignRequest::from_bytes(&[1, 2, 3]),
            Err(InternalError::Deserialization(_))
        ));
    }

    #[test]
    fn test_group_is_optional_in_self_describing_formats() {
        let request: SignRequest =
            serde_json::from_str(r#"{"signed_message":[1],"public_key":[2]}"#).unwrap();
        assert_eq!(request.group, None);
    }
}
