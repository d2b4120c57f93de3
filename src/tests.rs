// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::*;

use crate::{
    attestation::{AttestationInputs, SuccinctProver, TransparentProver},
    errors::Result,
    sharing::combine_leaf_pair,
    storage::RecordStore,
    utils::fr_to_bytes,
};
use rand::rngs::OsRng;
use std::{path::Path, sync::Arc};

const ATTRIBUTES: [(&str, &str); 4] = [
    ("alice:7001", "age>=18"),
    ("bob:7002", "resident=FR"),
    ("carol:7003", "member=2021"),
    ("dave:7004", "age>=21"),
];

fn participant_settings() -> ParticipantSettings {
    ParticipantSettings {
        session_timeout_secs: 10,
        submit_timeout_secs: 10,
        ..ParticipantSettings::default()
    }
}

/// Runs every participant concurrently against `coordinator` and returns the
/// outcomes sorted by sequence number.
async fn run_group(
    coordinator: &Arc<Coordinator>,
    participants: Vec<Participant>,
) -> Result<Vec<(Participant, ParticipantOutcome)>> {
    let network = MemoryNetwork::new();
    let mut tasks = Vec::new();
    for participant in participants {
        let mut inbox = network.listen(participant.address());
        let coordinator = coordinator.clone();
        let network = network.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = participant
                .run(coordinator.as_ref(), &network, &mut inbox, &mut OsRng)
                .await;
            outcome.map(|outcome| (participant, outcome))
        }));
    }
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.map_err(|_| InternalError::InternalInvariantFailed)??);
    }
    outcomes.sort_by_key(|(_, outcome)| outcome.sequence);
    Ok(outcomes)
}

fn coordinator_with_records(dir: &Path) -> Result<Arc<Coordinator>> {
    Ok(Arc::new(Coordinator::new(CoordinatorConfig {
        record_dir: Some(dir.to_path_buf()),
        ..CoordinatorConfig::default()
    })?))
}

#[tokio::test]
async fn run_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let coordinator = coordinator_with_records(dir.path())?;
    let participants = ATTRIBUTES
        .iter()
        .map(|(address, attribute)| {
            Participant::new(*address, *attribute, participant_settings(), &mut OsRng)
        })
        .collect::<Result<Vec<_>>>()?;

    let outcomes = run_group(&coordinator, participants).await?;

    // Pairing hands out consecutive sequence numbers in pairs.
    let sequences: Vec<_> = outcomes.iter().map(|(_, o)| o.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(outcomes[0].1.peer_address, outcomes[1].0.address());
    assert_eq!(outcomes[3].1.peer_address, outcomes[2].0.address());

    // The two payloads of a pair reveal both commitments when added.
    for pair in outcomes.chunks(2) {
        let (first, second) = (&pair[0].1, &pair[1].1);
        let (x_first, x_second) = combine_leaf_pair(&first.joint_payload, &second.joint_payload)?;
        assert_eq!(x_first, fr_to_bytes(&first.commitment));
        assert_eq!(x_second, fr_to_bytes(&second.commitment));
    }

    // Everyone holds the same root and aggregate signature.
    let root = outcomes[0].1.merkle_root.clone();
    let signature = outcomes[0].1.aggregate_signature;
    for (_, outcome) in &outcomes {
        assert_eq!(outcome.merkle_root, root);
        assert_eq!(outcome.aggregate_signature, signature);
    }
    assert_eq!(coordinator.published_root(42), Some(root.clone()));

    // The persisted record verifies over the root.
    let record = RecordStore::open(dir.path())?.load_aggregate(42)?;
    assert_eq!(Some(record), coordinator.aggregate_record(42));
    assert_eq!(record.signature, signature);
    assert!(record.verify(&root)?);
    assert!(!record.verify(b"another root")?);

    // Both sessions were retired when they completed.
    assert!(!coordinator.has_result_session(42));
    assert!(!coordinator.has_sign_session(42));

    // Any leaf of the root can be attested.
    let leaves = coordinator.published_leaves(42).unwrap();
    let mut submitted: Vec<_> = outcomes.iter().map(|(_, o)| o.joint_payload).collect();
    let mut accumulated = leaves.clone();
    submitted.sort();
    accumulated.sort();
    assert_eq!(submitted, accumulated);

    let prover = TransparentProver::new(MiMC::new(), LeafMode::Reconstruct);
    for index in 0..leaves.len() as u64 {
        let proof = coordinator.prove_leaf(42, index)?;
        assert_eq!(proof.root, root);

        let inputs = AttestationInputs::from_proof(LeafMode::Reconstruct, &proof, &record)?;
        assert!(inputs.public.valid);
        let transcript = prover.prove(&inputs)?;
        assert!(prover.verify(&inputs.public, &transcript)?);
    }
    Ok(())
}

#[tokio::test]
async fn test_consecutive_rounds_reuse_the_group() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let coordinator = coordinator_with_records(dir.path())?;
    let signers: Vec<_> = (0..4).map(|_| Signer::random(&mut OsRng)).collect();
    let build = || {
        ATTRIBUTES
            .iter()
            .zip(&signers)
            .map(|((address, attribute), signer)| {
                Participant::with_signer(
                    *address,
                    *attribute,
                    participant_settings(),
                    signer.clone(),
                )
            })
            .collect::<Vec<_>>()
    };

    let first = run_group(&coordinator, build()).await?;
    let second = run_group(&coordinator, build()).await?;

    // The counter keeps running across rounds.
    assert_eq!(second[0].1.sequence, 5);
    // Fresh shares give fresh payloads and so a fresh root.
    assert_ne!(first[0].1.merkle_root, second[0].1.merkle_root);
    // The latest record replaces the previous one; the aggregate key is the
    // same since the signers are.
    let record = RecordStore::open(dir.path())?.load_aggregate(42)?;
    assert!(record.verify(&second[0].1.merkle_root)?);
    assert!(!record.verify(&first[0].1.merkle_root)?);
    Ok(())
}
