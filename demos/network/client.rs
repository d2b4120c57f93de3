// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    cli::{finish_progress_bar, render_outcome, start_progress_bar},
    common::{Args, Result},
};
use async_trait::async_trait;
use mpc_attest::{
    errors::Result as ProtocolResult,
    exchange::{PeerConnector, ShareSender},
    messages::{
        ErrorResponse, MatchResponse, RegisterRequest, ResultRequest, ResultResponse,
        ShareMessage, SignRequest, SignResponse, WireMessage,
    },
    CoordinatorApi, InternalError, Participant, ParticipantSettings,
};
use rand::rngs::OsRng;
use rocket::State;
use tokio::sync::mpsc;
use tracing::error;

/// Where `/chat` delivers the peer's share.
struct Inbox(mpsc::UnboundedSender<ShareMessage>);

#[post("/chat", data = "<message_bytes>")]
async fn chat(inbox: &State<Inbox>, message_bytes: Vec<u8>) -> Result {
    let message = ShareMessage::from_bytes(&message_bytes)?;
    inbox
        .0
        .send(message)
        .map_err(|_| anyhow!("This participant is no longer listening"))?;
    Ok(())
}

fn transport_error(e: reqwest::Error) -> InternalError {
    error!("Transport failure: {e}");
    InternalError::PeerDisconnected
}

/// The coordinator's RPC surface over HTTP.
struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCoordinator {
    fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{port}"),
        }
    }

    async fn call<Req, Resp>(&self, route: &str, request: Req) -> ProtocolResult<Resp>
    where
        Req: WireMessage,
        Resp: WireMessage,
    {
        let response = self
            .client
            .post(format!("{}/{route}", self.base_url))
            .body(request.to_bytes()?)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if status.is_success() {
            Resp::from_bytes(&body)
        } else {
            Err(ErrorResponse::from_bytes(&body)?.error)
        }
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn register(&self, request: RegisterRequest) -> ProtocolResult<MatchResponse> {
        self.call("register", request).await
    }

    async fn submit_result(&self, request: ResultRequest) -> ProtocolResult<ResultResponse> {
        self.call("submit_result", request).await
    }

    async fn submit_signature(&self, request: SignRequest) -> ProtocolResult<SignResponse> {
        self.call("submit_signature", request).await
    }
}

/// Posts the share to the peer's `/chat` route.
struct HttpLink {
    client: reqwest::Client,
    url: String,
}

#[async_trait]
impl ShareSender for HttpLink {
    async fn send_share(&mut self, message: ShareMessage) -> ProtocolResult<()> {
        let response = self
            .client
            .post(&self.url)
            .body(message.to_bytes()?)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            error!("Peer refused the share: {}", response.status());
            return Err(InternalError::PeerDisconnected);
        }
        Ok(())
    }
}

#[derive(Default)]
struct HttpConnector {
    client: reqwest::Client,
}

#[async_trait]
impl PeerConnector for HttpConnector {
    type Sender = HttpLink;

    async fn connect(&self, peer_address: &str) -> ProtocolResult<HttpLink> {
        Ok(HttpLink {
            client: self.client.clone(),
            url: format!("http://{peer_address}/chat"),
        })
    }
}

pub(crate) async fn client_main(args: Args) -> Result {
    let settings = match &args.config {
        Some(path) => ParticipantSettings::load(path)?,
        None => ParticipantSettings::default(),
    };
    let attribute = args
        .attribute
        .ok_or_else(|| anyhow!("A participant needs an --attribute"))?;
    let address = format!("127.0.0.1:{}", args.port);

    // Listen before registering: the peer sends as soon as it is paired.
    let (sender, mut inbox) = mpsc::unbounded_channel();
    let figment = rocket::Config::figment().merge(("port", args.port));
    let rocket = rocket::custom(figment)
        .mount("/", routes![chat])
        .manage(Inbox(sender))
        .ignite()
        .await?;
    let shutdown = rocket.shutdown();
    let server = tokio::spawn(rocket.launch());

    let participant = Participant::new(address, attribute, settings, &mut OsRng)?;
    let coordinator = HttpCoordinator::new(args.coordinator_port);

    let pb = start_progress_bar();
    let outcome = participant
        .run(&coordinator, &HttpConnector::default(), &mut inbox, &mut OsRng)
        .await;
    shutdown.notify();
    let _ = server.await;

    let outcome = outcome?;
    finish_progress_bar(pb, render_outcome(&outcome));
    Ok(())
}
