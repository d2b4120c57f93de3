// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! To run this, spin up a coordinator in one terminal:
//! `cargo run --example network -- -r coordinator -p 8000`
//!
//! Then start as many participants as the coordinator expects (four by
//! default), each on its own port and in a separate terminal:
//! `cargo run --example network -- -r participant -p 8001 -c 8000 -a age>=18`
//! `cargo run --example network -- -r participant -p 8002 -c 8000 -a resident`
//! `cargo run --example network -- -r participant -p 8003 -c 8000 -a member`
//! `cargo run --example network -- -r participant -p 8004 -c 8000 -a age>=21`
//!
//! Both roles accept a TOML file with `--config`.

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate anyhow;

mod cli;
mod client;
mod common;
mod server;

use clap::Parser;
use client::client_main;
use common::{Args, Result, RoleType};
use server::server_main;
use tracing_subscriber::EnvFilter;

#[rocket::main]
async fn main() -> Result {
    let args = Args::parse();
    let filter = EnvFilter::from_default_env().add_directive("mpc_attest=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();

    match args.role {
        RoleType::Coordinator => {
            server_main(args).await?;
        }
        RoleType::Participant => {
            client_main(args).await?;
        }
    }

    Ok(())
}
