use criterion::{criterion_group, criterion_main, Criterion};

use mpc_attest::{
    errors::Result, Coordinator, CoordinatorConfig, InternalError, MemoryNetwork, Participant,
    ParticipantOutcome, ParticipantSettings,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn init_new_player_set(num_players: usize) -> Result<(Arc<Coordinator>, Vec<Participant>)> {
    let coordinator = Coordinator::new(CoordinatorConfig {
        expected_participants: num_players,
        ..CoordinatorConfig::default()
    })?;
    let players = (0..num_players)
        .map(|i| {
            Participant::new(
                format!("player-{i}"),
                format!("attribute-{i}"),
                ParticipantSettings::default(),
                &mut OsRng,
            )
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((Arc::new(coordinator), players))
}

/// Runs one full round: pairing, share exchange, root and aggregate
/// signature.
async fn run_round(num_players: usize) -> Result<Vec<ParticipantOutcome>> {
    let (coordinator, players) = init_new_player_set(num_players)?;
    let network = MemoryNetwork::new();
    let mut tasks = Vec::new();
    for player in players {
        let mut inbox = network.listen(player.address());
        let coordinator = coordinator.clone();
        let network = network.clone();
        tasks.push(tokio::spawn(async move {
            player
                .run(coordinator.as_ref(), &network, &mut inbox, &mut OsRng)
                .await
        }));
    }
    let mut outcomes = Vec::with_capacity(num_players);
    for task in tasks {
        outcomes.push(task.await.map_err(|_| InternalError::InternalInvariantFailed)??);
    }
    Ok(outcomes)
}

fn run_benchmarks_for_given_size(c: &mut Criterion, runtime: &Runtime, num_players: usize) {
    c.bench_function(&format!("Full round with {num_players} participants"), |b| {
        b.iter(|| runtime.block_on(run_round(num_players)).unwrap())
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    run_benchmarks_for_given_size(c, &runtime, 2);
    run_benchmarks_for_given_size(c, &runtime, 4);
    run_benchmarks_for_given_size(c, &runtime, 8);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
