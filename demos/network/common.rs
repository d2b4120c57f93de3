// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use mpc_attest::messages::{ErrorResponse, WireMessage};
use rocket::{
    http::Status,
    response::{self, Responder},
    Request,
};
use std::path::PathBuf;

pub(crate) type Result<T = ()> = std::result::Result<T, ErrorWrapper>;

#[derive(Debug)]
pub(crate) struct ErrorWrapper(pub(crate) anyhow::Error);

impl<E> From<E> for ErrorWrapper
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        ErrorWrapper(error.into())
    }
}

#[rocket::async_trait]
impl<'r> Responder<'r, 'static> for ErrorWrapper {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        response::Debug(self.0).respond_to(request)
    }
}

#[derive(clap::Parser)]
pub(crate) struct Args {
    #[clap(short, long, arg_enum)]
    pub(crate) role: RoleType,
    /// Port this process listens on.
    #[clap(short, long, default_value_t = 8000)]
    pub(crate) port: u16,
    /// Port of the coordinator.
    #[clap(short, long, default_value_t = 8000)]
    pub(crate) coordinator_port: u16,
    /// The attribute a participant commits to.
    #[clap(short, long)]
    pub(crate) attribute: Option<String>,
    /// TOML configuration for the chosen role.
    #[clap(long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(clap::ArgEnum, Clone)]
pub(crate) enum RoleType {
    Coordinator,
    Participant,
}

/// A bincode body with its status. Protocol errors travel as an
/// [`ErrorResponse`] so the caller gets the original error back.
pub(crate) type WireReply = (Status, Vec<u8>);

pub(crate) fn wire_reply<T: WireMessage>(result: mpc_attest::errors::Result<T>) -> Result<WireReply> {
    match result {
        Ok(message) => Ok((Status::Ok, message.to_bytes()?)),
        Err(error) => Ok((Status::Conflict, ErrorResponse { error }.to_bytes()?)),
    }
}
