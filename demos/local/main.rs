// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Example usage of the [`mpc_attest`] crate within one process.
//!
//! Each [`Participant`] is a tokio task; shares travel over a
//! [`MemoryNetwork`]. Once the group is done, every leaf of the root is
//! attested with the [`TransparentProver`].
//!
//! `cargo run --example local -- -n 4 --record-dir ./records`

use anyhow::{self, bail};
use clap::Parser;
use mpc_attest::{
    attestation::{AttestationInputs, SuccinctProver, TransparentProver},
    Coordinator, CoordinatorConfig, LeafMode, MemoryNetwork, MiMC, Participant,
    ParticipantSettings,
};
use rand::rngs::OsRng;
use std::{path::PathBuf, sync::Arc, time::Instant};
use tracing::{info, instrument, span, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser, Debug)]
struct CommandLineArgs {
    /// Number of participants. Must be even.
    #[clap(short, long, default_value_t = 4)]
    number_of_participants: usize,
    /// Where the coordinator writes aggregate records.
    #[clap(long)]
    record_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLineArgs::parse();
    // Set up logging.
    let filter = EnvFilter::from_default_env().add_directive("mpc_attest=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    let span = span!(Level::INFO, "main");
    let _enter = span.entered();

    let coordinator = Arc::new(Coordinator::new(CoordinatorConfig {
        expected_participants: cli.number_of_participants,
        record_dir: cli.record_dir,
        ..CoordinatorConfig::default()
    })?);
    let group = coordinator.config().default_group;

    let start = Instant::now();
    run_group(&coordinator, cli.number_of_participants).await?;
    info!("Group {group} finished in {:?}", start.elapsed());

    attest_every_leaf(&coordinator, group)?;
    Ok(())
}

#[instrument(skip(coordinator))]
async fn run_group(coordinator: &Arc<Coordinator>, participants: usize) -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let mut tasks = Vec::new();
    for i in 0..participants {
        let participant = Participant::new(
            format!("participant-{i}"),
            format!("attribute-{i}"),
            ParticipantSettings::default(),
            &mut OsRng,
        )?;
        let mut inbox = network.listen(participant.address());
        let coordinator = coordinator.clone();
        let network = network.clone();
        tasks.push(tokio::spawn(async move {
            participant
                .run(coordinator.as_ref(), &network, &mut inbox, &mut OsRng)
                .await
        }));
    }
    for task in tasks {
        let outcome = task.await??;
        info!(
            "Sequence {} holds root {}",
            outcome.sequence,
            hex::encode(&outcome.merkle_root)
        );
    }
    Ok(())
}

fn attest_every_leaf(coordinator: &Coordinator, group: u64) -> anyhow::Result<()> {
    let record = match coordinator.aggregate_record(group) {
        Some(record) => record,
        None => bail!("group {group} has no aggregate signature"),
    };
    let leaves = coordinator.published_leaves(group).unwrap_or_default();
    let prover = TransparentProver::new(MiMC::new(), LeafMode::Reconstruct);
    for index in 0..leaves.len() as u64 {
        let proof = coordinator.prove_leaf(group, index)?;
        let inputs = AttestationInputs::from_proof(LeafMode::Reconstruct, &proof, &record)?;
        let transcript = prover.prove(&inputs)?;
        info!(
            "Leaf {index}: {} siblings, verified: {}",
            transcript.path.len(),
            prover.verify(&inputs.public, &transcript)?
        );
    }
    Ok(())
}
