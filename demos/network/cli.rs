// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use indicatif::{ProgressBar, ProgressStyle};
use mpc_attest::ParticipantOutcome;

pub(crate) fn start_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(80);
    pb.set_message("Waiting for a peer and the rest of the group...");
    let waiting_style = ProgressStyle::default_spinner()
        .template("[{elapsed_precise}] {spinner:.cyan/blue} {msg:.yellow}")
        .tick_strings(&[
            "[    ]", "[=   ]", "[==  ]", "[=== ]", "[ ===]", "[  ==]", "[   =]", "[    ]",
            "[   =]", "[  ==]", "[ ===]", "[====]", "[=== ]", "[==  ]", "[=   ]",
        ]);

    pb.set_style(waiting_style);
    pb
}

pub(crate) fn finish_progress_bar(pb: ProgressBar, message: String) {
    let done_style =
        ProgressStyle::default_spinner().template("[{elapsed_precise}] {msg:.bold.green}");
    pb.set_style(done_style);
    pb.finish_with_message(message);
}

pub(crate) fn render_outcome(outcome: &ParticipantOutcome) -> String {
    format!(
        "Run complete as sequence {} (paired with {}).\n\tMerkle root: {}\n\tAggregate signature: {}",
        outcome.sequence,
        outcome.peer_address,
        hex::encode(&outcome.merkle_root),
        hex::encode(mpc_attest::bls::encode_g2(&outcome.aggregate_signature)),
    )
}
