// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The coordinating service.
//!
//! The [`Coordinator`] pairs registering participants, collects their
//! reconstructed payloads into a per-group result session that publishes the
//! Merkle root of the group, and collects signatures over that root into a
//! signing session that publishes the verified aggregate signature.
//!
//! Every blocking call takes a deadline. Expiry fails only that call with
//! [`InternalError::Cancelled`]; the session keeps what has arrived, and the
//! caller may submit again to collect the outcome. A session leaves the
//! registry as soon as it is complete, so the next round of a group never
//! waits on a contributor of the previous one.

mod pairing;
mod session;

use crate::{
    bls::{aggregate, decode_g1, decode_g2, encode_g1, encode_g2, verify, AggregateRecord},
    config::CoordinatorConfig,
    errors::{InternalError, Result},
    merkle::{MerkleProof, Tree},
    messages::{
        MatchResponse, RegisterRequest, ResultRequest, ResultResponse, SignRequest, SignResponse,
    },
    mimc::MiMC,
    sharing::{validate_joint_payload, JointPayload},
    storage::RecordStore,
};
use ark_bls12_381::{G1Affine, G2Affine};
use async_trait::async_trait;
use pairing::PairingQueue;
use parking_lot::Mutex;
use session::{wait_outcome, Admission, SessionRegistry};
use std::{collections::HashMap, time::Duration};
use tracing::{error, info, instrument, warn};

/// The coordinator's RPC surface.
///
/// Implemented by [`Coordinator`] itself and by remote clients of it, so a
/// participant can run against either.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Wait to be paired.
    async fn register(&self, request: RegisterRequest) -> Result<MatchResponse>;
    /// Submit a joint payload and wait for the group's Merkle root.
    async fn submit_result(&self, request: ResultRequest) -> Result<ResultResponse>;
    /// Submit a signature over the root and wait for the aggregate.
    async fn submit_signature(&self, request: SignRequest) -> Result<SignResponse>;
}

type ResultSessions = SessionRegistry<i32, JointPayload, Vec<u8>>;
/// Signing contributions are keyed by the root being signed and the encoded
/// public key, so the same signer can take part in consecutive rounds.
type SignSessions = SessionRegistry<(Vec<u8>, Vec<u8>), (G1Affine, G2Affine), SignResponse>;

/// The coordinating service. Share it between tasks with an `Arc`.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    pairing: Mutex<PairingQueue>,
    results: ResultSessions,
    signatures: SignSessions,
    roots: Mutex<HashMap<u64, Vec<u8>>>,
    leaves: Mutex<HashMap<u64, Vec<JointPayload>>>,
    aggregates: Mutex<HashMap<u64, AggregateRecord>>,
    store: Option<RecordStore>,
}

/// Withdraws a registration if the waiting call is dropped.
struct Withdrawal<'a> {
    queue: &'a Mutex<PairingQueue>,
    ticket: u64,
    armed: bool,
}

impl Drop for Withdrawal<'_> {
    fn drop(&mut self) {
        if self.armed && !self.queue.lock().withdraw(self.ticket) {
            warn!("A registration was abandoned after it had been paired");
        }
    }
}

impl Coordinator {
    /// Create a coordinator. Opens the record directory if one is configured.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let store = config
            .record_dir
            .as_ref()
            .map(RecordStore::open)
            .transpose()?;
        Ok(Self {
            config,
            pairing: Mutex::new(PairingQueue::default()),
            results: ResultSessions::default(),
            signatures: SignSessions::default(),
            roots: Mutex::new(HashMap::new()),
            leaves: Mutex::new(HashMap::new()),
            aggregates: Mutex::new(HashMap::new()),
            store,
        })
    }

    /// Settings in use.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of registrations still waiting for a partner.
    pub fn pending_registrations(&self) -> usize {
        self.pairing.lock().len()
    }

    /// The most recent Merkle root published for `group`.
    pub fn published_root(&self, group: u64) -> Option<Vec<u8>> {
        self.roots.lock().get(&group).cloned()
    }

    /// The payloads behind the most recent root of `group`, in the order
    /// they were accumulated.
    pub fn published_leaves(&self, group: u64) -> Option<Vec<JointPayload>> {
        self.leaves.lock().get(&group).cloned()
    }

    /// Inclusion proof for leaf `index` under the most recent root of
    /// `group`.
    pub fn prove_leaf(&self, group: u64, index: u64) -> Result<MerkleProof> {
        let leaves = self
            .published_leaves(group)
            .ok_or(InternalError::UnknownGroupRoot(group))?;
        if index >= leaves.len() as u64 {
            return Err(InternalError::InvalidArgument(format!(
                "leaf index {index} out of range for {} leaves",
                leaves.len()
            )));
        }
        let mut tree = Tree::new(MiMC::new());
        tree.set_index(index)?;
        for leaf in &leaves {
            tree.push(leaf)?;
        }
        tree.prove()
    }

    /// The most recent aggregate record of `group`.
    pub fn aggregate_record(&self, group: u64) -> Option<AggregateRecord> {
        self.aggregates.lock().get(&group).copied()
    }

    /// Whether `group` has a result session still collecting payloads.
    pub fn has_result_session(&self, group: u64) -> bool {
        self.results.contains(group)
    }

    /// Whether `group` has a signing session still collecting signatures.
    pub fn has_sign_session(&self, group: u64) -> bool {
        self.signatures.contains(group)
    }

    /// Queue `address` and wait until it is paired.
    ///
    /// The two oldest waiting registrations are paired with the next two
    /// sequence numbers. On expiry the registration is withdrawn, unless it
    /// was paired in the meantime, in which case the pairing is returned.
    #[instrument(skip(self), err(Debug))]
    pub async fn register(&self, address: &str, timeout: Duration) -> Result<MatchResponse> {
        let (ticket, mut receiver) = self.pairing.lock().enqueue(address.to_string());
        let mut withdrawal = Withdrawal {
            queue: &self.pairing,
            ticket,
            armed: true,
        };

        let waited = tokio::time::timeout(timeout, &mut receiver).await;
        withdrawal.armed = false;
        match waited {
            Ok(Ok(assignment)) => Ok(assignment),
            Ok(Err(_)) => {
                error!("Pairing reply channel closed without a reply");
                Err(InternalError::InternalInvariantFailed)
            }
            Err(_) => {
                let withdrawn = self.pairing.lock().withdraw(ticket);
                if withdrawn {
                    Err(InternalError::Cancelled)
                } else {
                    receiver.try_recv().map_err(|_| InternalError::Cancelled)
                }
            }
        }
    }

    /// Contribute a joint payload for `sequence` and wait for the group's
    /// Merkle root.
    ///
    /// Payloads are accumulated in arrival order. A second submission for a
    /// sequence number already present is ignored but still waits for the
    /// root, including after the session completed, as long as no later
    /// round of the group has completed since.
    #[instrument(skip(self, payload), err(Debug))]
    pub async fn submit_result(
        &self,
        sequence: i32,
        payload: &[u8],
        group: u64,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let payload = validate_joint_payload(payload)?;
        let (session, admission) = self.results.admit(
            group,
            self.config.expected_participants,
            sequence,
            payload,
        );
        match admission {
            Admission::Complete(payloads) => {
                let outcome = self.build_root(group, &payloads);
                session.publish(outcome);
            }
            Admission::Accepted => {}
            Admission::Ignored => info!("Ignoring repeated submission for sequence {sequence}"),
        }
        wait_outcome(session.subscribe(), timeout).await
    }

    /// Contribute a signature over the group's root and wait for the
    /// aggregate.
    ///
    /// The aggregate is verified against the published root before it is
    /// recorded. A repeated public key is ignored.
    #[instrument(skip(self, signature, public_key), err(Debug))]
    pub async fn submit_signature(
        &self,
        signature: &[u8],
        public_key: &[u8],
        group: u64,
        timeout: Duration,
    ) -> Result<SignResponse> {
        let signature = decode_g2(signature)?;
        let public_key = decode_g1(public_key)?;
        let root = self
            .published_root(group)
            .ok_or(InternalError::UnknownGroupRoot(group))?;

        let key = (root, encode_g1(&public_key));
        let (session, admission) = self.signatures.admit(
            group,
            self.config.expected_participants,
            key,
            (public_key, signature),
        );
        match admission {
            Admission::Complete(contributions) => {
                let outcome = self.finish_signing(group, contributions);
                session.publish(outcome);
            }
            Admission::Accepted => {}
            Admission::Ignored => info!("Ignoring repeated signature from the same public key"),
        }

        wait_outcome(session.subscribe(), timeout).await
    }

    fn build_root(&self, group: u64, payloads: &[JointPayload]) -> Result<Vec<u8>> {
        let mut tree = Tree::new(MiMC::new());
        for payload in payloads {
            tree.push(payload)?;
        }
        let root = tree.root()?.ok_or(InternalError::EmptyAccumulator)?;
        info!(group, "Merkle root: {}", hex::encode(&root));
        let _ = self.leaves.lock().insert(group, payloads.to_vec());
        let _ = self.roots.lock().insert(group, root.clone());
        Ok(root)
    }

    fn finish_signing(
        &self,
        group: u64,
        contributions: Vec<(G1Affine, G2Affine)>,
    ) -> Result<SignResponse> {
        let root = self
            .published_root(group)
            .ok_or(InternalError::UnknownGroupRoot(group))?;
        let (public_keys, signatures): (Vec<_>, Vec<_>) = contributions.into_iter().unzip();
        let (public_key, signature) = aggregate(&public_keys, &signatures)?;
        if !verify(&public_key, &signature, &root)? {
            error!(group, "Aggregate signature does not verify against the root");
            return Err(InternalError::AggregateVerificationFailed);
        }

        let record = AggregateRecord {
            public_key,
            signature,
        };
        if let Some(store) = &self.store {
            let _ = store.save_aggregate(group, &record)?;
        }
        let _ = self.aggregates.lock().insert(group, record);

        let aggregate_result = encode_g2(&signature);
        info!(
            group,
            "Aggregate signature complete: {}",
            hex::encode(&aggregate_result)
        );
        Ok(SignResponse {
            aggregate_result,
            merkle_root: root,
        })
    }

    fn resolve_group(&self, group: Option<u64>) -> u64 {
        group.unwrap_or(self.config.default_group)
    }
}

#[async_trait]
impl CoordinatorApi for Coordinator {
    async fn register(&self, request: RegisterRequest) -> Result<MatchResponse> {
        Coordinator::register(self, &request.address, self.config.wait_timeout()).await
    }

    async fn submit_result(&self, request: ResultRequest) -> Result<ResultResponse> {
        let group = self.resolve_group(request.group);
        let processed_data = Coordinator::submit_result(
            self,
            request.sequence,
            &request.result_data,
            group,
            self.config.wait_timeout(),
        )
        .await?;
        Ok(ResultResponse { processed_data })
    }

    async fn submit_signature(&self, request: SignRequest) -> Result<SignResponse> {
        let group = self.resolve_group(request.group);
        Coordinator::submit_signature(
            self,
            &request.signed_message,
            &request.public_key,
            group,
            self.config.wait_timeout(),
        )
        .await
    }
}
