// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! This module contains [`Participant`], which drives one participant
//! through a complete run against a coordinator:
//!
//! 1. register and wait to be paired,
//! 2. exchange shares with the paired peer,
//! 3. submit the joint payload and receive the group's Merkle root,
//! 4. sign the root and receive the aggregate signature.
//!
//! Errors end the run; nothing is retried.

use crate::{
    bls::{decode_g2, encode_g1, encode_g2, Signer},
    config::ParticipantSettings,
    coordinator::CoordinatorApi,
    errors::{InternalError, Result},
    exchange::{exchange_shares, PeerConnector, ShareReceiver},
    messages::{RegisterRequest, ResultRequest, SignRequest},
    sharing::{commit, reconstruct, split, JointPayload},
    storage::load_or_create_keypair,
};
use ark_bls12_381::G2Affine;
use ark_bn254::Fr;
use rand::{CryptoRng, RngCore};
use std::{future::Future, time::Duration};
use tracing::{error, info, instrument};

/// What a participant holds at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantOutcome {
    /// The sequence number assigned at pairing.
    pub sequence: i32,
    /// Exchange address of the paired peer.
    pub peer_address: String,
    /// The committed attribute value.
    pub commitment: Fr,
    /// The payload submitted to the coordinator.
    pub joint_payload: JointPayload,
    /// The group's Merkle root.
    pub merkle_root: Vec<u8>,
    /// The aggregate signature over `merkle_root`.
    pub aggregate_signature: G2Affine,
}

/// A single participant of the attestation protocol.
#[derive(Debug)]
pub struct Participant {
    address: String,
    attribute: String,
    signer: Signer,
    settings: ParticipantSettings,
}

impl Participant {
    /// Create a participant listening on `address`.
    ///
    /// The signing keypair is read from `settings.keypair_path` (and created
    /// there on first use), or drawn fresh when no path is configured.
    pub fn new<R: RngCore + CryptoRng>(
        address: impl Into<String>,
        attribute: impl Into<String>,
        settings: ParticipantSettings,
        rng: &mut R,
    ) -> Result<Self> {
        settings.validate()?;
        let signer = match &settings.keypair_path {
            Some(path) => load_or_create_keypair(path)?,
            None => Signer::random(rng),
        };
        Ok(Self::with_signer(address, attribute, settings, signer))
    }

    /// Create a participant with a given keypair.
    pub fn with_signer(
        address: impl Into<String>,
        attribute: impl Into<String>,
        settings: ParticipantSettings,
        signer: Signer,
    ) -> Self {
        Self {
            address: address.into(),
            attribute: attribute.into(),
            signer,
            settings,
        }
    }

    /// The address peers send their share to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The signing keypair.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Settings in use.
    pub fn settings(&self) -> &ParticipantSettings {
        &self.settings
    }

    /// Run the protocol once.
    ///
    /// `inbox` must already be receiving on [`Participant::address`] before
    /// this is called, since the peer may send its share as soon as it is
    /// paired.
    #[instrument(skip_all, fields(address = %self.address), err(Debug))]
    pub async fn run<C, N, I, R>(
        &self,
        coordinator: &C,
        connector: &N,
        inbox: &mut I,
        rng: &mut R,
    ) -> Result<ParticipantOutcome>
    where
        C: CoordinatorApi + ?Sized,
        N: PeerConnector + ?Sized,
        I: ShareReceiver + ?Sized,
        R: RngCore + CryptoRng,
    {
        let commitment = commit(&self.attribute)?;
        let shares = split(&commitment, rng);
        let deadline = self.settings.submit_timeout();
        let group = Some(self.settings.group);

        let assignment = with_deadline(
            deadline,
            coordinator.register(RegisterRequest {
                address: self.address.clone(),
            }),
        )
        .await?;
        let sequence = assignment.peer_sequence;
        info!(
            "Paired with {} as sequence {}",
            assignment.peer_address, sequence
        );

        let mut link = connector.connect(&assignment.peer_address).await?;
        let received = exchange_shares(
            &mut link,
            inbox,
            sequence,
            &shares.outgoing(),
            self.settings.session_timeout(),
        )
        .await?;
        let joint_payload = reconstruct(&shares.retained(), &received, sequence);

        let merkle_root = with_deadline(
            deadline,
            coordinator.submit_result(ResultRequest {
                sequence,
                result_data: joint_payload.to_vec(),
                group,
            }),
        )
        .await?
        .processed_data;
        info!("Merkle root: {}", hex::encode(&merkle_root));

        let signature = self.signer.sign(&merkle_root)?;
        let response = with_deadline(
            deadline,
            coordinator.submit_signature(SignRequest {
                signed_message: encode_g2(&signature),
                public_key: encode_g1(self.signer.public_key()),
                group,
            }),
        )
        .await?;
        if response.merkle_root != merkle_root {
            error!("The coordinator aggregated signatures over a different root");
            return Err(InternalError::InternalInvariantFailed);
        }
        let aggregate_signature = decode_g2(&response.aggregate_result)?;

        Ok(ParticipantOutcome {
            sequence,
            peer_address: assignment.peer_address,
            commitment,
            joint_payload,
            merkle_root,
            aggregate_signature,
        })
    }
}

/// Bound a coordinator call by the participant's own deadline.
async fn with_deadline<T>(deadline: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| InternalError::Cancelled)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CoordinatorConfig,
        coordinator::Coordinator,
        exchange::MemoryNetwork,
        sharing::combine_leaf_pair,
        utils::fr_to_bytes,
    };
    use ark_ec::CurveGroup;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    fn settings() -> ParticipantSettings {
        ParticipantSettings {
            session_timeout_secs: 5,
            submit_timeout_secs: 5,
            ..ParticipantSettings::default()
        }
    }

    #[tokio::test]
    async fn test_pair_completes_a_run() -> Result<()> {
        let coordinator = Arc::new(Coordinator::new(CoordinatorConfig {
            expected_participants: 2,
            ..CoordinatorConfig::default()
        })?);
        let network = MemoryNetwork::new();

        let mut tasks = Vec::new();
        for (address, attribute) in [("alice", "over-18"), ("bob", "resident")] {
            let participant = Participant::new(address, attribute, settings(), &mut OsRng)?;
            let mut inbox = network.listen(address);
            let coordinator = coordinator.clone();
            let network = network.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = participant
                    .run(coordinator.as_ref(), &network, &mut inbox, &mut OsRng)
                    .await;
                (participant.signer().clone(), outcome)
            }));
        }
        let mut outcomes = Vec::new();
        for task in tasks {
            let (signer, outcome) = task.await.unwrap();
            outcomes.push((signer, outcome?));
        }
        outcomes.sort_by_key(|(_, outcome)| outcome.sequence);
        let (first, second) = (&outcomes[0].1, &outcomes[1].1);

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(first.merkle_root, second.merkle_root);
        assert_eq!(first.aggregate_signature, second.aggregate_signature);

        let (x_first, x_second) = combine_leaf_pair(&first.joint_payload, &second.joint_payload)?;
        assert_eq!(x_first, fr_to_bytes(&first.commitment));
        assert_eq!(x_second, fr_to_bytes(&second.commitment));

        let record = coordinator.aggregate_record(42).unwrap();
        let public_key = (*outcomes[0].0.public_key() + *outcomes[1].0.public_key()).into_affine();
        assert_eq!(record.public_key, public_key);
        assert_eq!(record.signature, first.aggregate_signature);
        assert!(record.verify(&first.merkle_root)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unpaired_participant_is_cancelled() -> Result<()> {
        let coordinator = Coordinator::new(CoordinatorConfig::default())?;
        let network = MemoryNetwork::new();
        let mut inbox = network.listen("loner");
        let participant = Participant::new(
            "loner",
            "attribute",
            ParticipantSettings {
                submit_timeout_secs: 1,
                ..settings()
            },
            &mut OsRng,
        )?;
        let result = participant
            .run(&coordinator, &network, &mut inbox, &mut OsRng)
            .await;
        assert_eq!(result, Err(InternalError::Cancelled));
        Ok(())
    }

    #[test]
    fn test_keypair_is_reused_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = ParticipantSettings {
            keypair_path: Some(dir.path().join("keypair.json")),
            ..settings()
        };
        let first = Participant::new("a", "x", settings.clone(), &mut OsRng)?;
        let second = Participant::new("a", "x", settings, &mut OsRng)?;
        assert_eq!(first.signer(), second.signer());
        Ok(())
    }
}
