// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::common::{wire_reply, Args, Result, WireReply};
use mpc_attest::{
    messages::{RegisterRequest, ResultRequest, SignRequest, WireMessage},
    Coordinator, CoordinatorApi, CoordinatorConfig,
};
use rocket::{data::ToByteUnit, State};
use tracing::info;

pub(crate) async fn server_main(args: Args) -> Result {
    let config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::default(),
    };
    info!(
        "Coordinating groups of {} participants",
        config.expected_participants
    );

    let figment = rocket::Config::figment().merge(("port", args.port)).merge((
        "limits",
        rocket::data::Limits::new().limit("bytes", 1.mebibytes()),
    ));

    let _rocket = rocket::custom(figment)
        .mount("/", routes![register, submit_result, submit_signature])
        .manage(Coordinator::new(config)?)
        .launch()
        .await?;

    Ok(())
}

/// Blocks until the caller is paired.
#[post("/register", data = "<request_bytes>")]
async fn register(coordinator: &State<Coordinator>, request_bytes: Vec<u8>) -> Result<WireReply> {
    let request = RegisterRequest::from_bytes(&request_bytes)?;
    wire_reply(CoordinatorApi::register(coordinator.inner(), request).await)
}

#[post("/submit_result", data = "<request_bytes>")]
async fn submit_result(
    coordinator: &State<Coordinator>,
    request_bytes: Vec<u8>,
) -> Result<WireReply> {
    let request = ResultRequest::from_bytes(&request_bytes)?;
    wire_reply(CoordinatorApi::submit_result(coordinator.inner(), request).await)
}

#[post("/submit_signature", data = "<request_bytes>")]
async fn submit_signature(
    coordinator: &State<Coordinator>,
    request_bytes: Vec<u8>,
) -> Result<WireReply> {
    let request = SignRequest::from_bytes(&request_bytes)?;
    wire_reply(CoordinatorApi::submit_signature(coordinator.inner(), request).await)
}
