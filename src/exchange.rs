// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The share exchange between the two members of a pairing.
//!
//! After pairing, each member sends its outgoing share to the address its
//! peer advertised and, at the same time, waits for the peer's share on its
//! own inbox. Exactly one [`ShareMessage`] travels in each direction.
//!
//! Transports plug in through [`ShareSender`], [`ShareReceiver`] and
//! [`PeerConnector`]. [`MemoryNetwork`] connects participants running in one
//! process.

use crate::{
    errors::{InternalError, Result},
    messages::ShareMessage,
    parameters::SHARE_LEN,
    sharing::{is_first_of_pair, ShareBytes},
    utils::fr_from_canonical_bytes,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

/// The sending half of a link to the paired peer.
#[async_trait]
pub trait ShareSender: Send {
    /// Deliver one message to the peer.
    async fn send_share(&mut self, message: ShareMessage) -> Result<()>;
}

/// A participant's inbox.
#[async_trait]
pub trait ShareReceiver: Send {
    /// Wait for the next message. Fails with
    /// [`InternalError::PeerDisconnected`] once nothing more can arrive.
    async fn recv_share(&mut self) -> Result<ShareMessage>;
}

/// Opens links to peer addresses.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// The link type produced by [`PeerConnector::connect`].
    type Sender: ShareSender;

    /// Open a link to the participant listening on `peer_address`.
    async fn connect(&self, peer_address: &str) -> Result<Self::Sender>;
}

#[async_trait]
impl ShareSender for mpsc::UnboundedSender<ShareMessage> {
    async fn send_share(&mut self, message: ShareMessage) -> Result<()> {
        self.send(message)
            .map_err(|_| InternalError::PeerDisconnected)
    }
}

#[async_trait]
impl ShareReceiver for mpsc::UnboundedReceiver<ShareMessage> {
    async fn recv_share(&mut self) -> Result<ShareMessage> {
        self.recv().await.ok_or(InternalError::PeerDisconnected)
    }
}

/// The sequence number of the other member of `sequence`'s pairing.
pub fn peer_sequence(sequence: i32) -> i32 {
    if is_first_of_pair(sequence) {
        sequence.wrapping_add(1)
    } else {
        sequence.wrapping_sub(1)
    }
}

/// Send `outgoing` to the peer and receive the peer's share, both within
/// `timeout`.
///
/// The received message must come from the other member of the pairing and
/// carry one canonical field element.
#[instrument(skip(sender, receiver, outgoing), err(Debug))]
pub async fn exchange_shares<S, R>(
    sender: &mut S,
    receiver: &mut R,
    sequence: i32,
    outgoing: &ShareBytes,
    timeout: Duration,
) -> Result<ShareBytes>
where
    S: ShareSender + ?Sized,
    R: ShareReceiver + ?Sized,
{
    let message = ShareMessage {
        sequence,
        payload: outgoing.to_vec(),
    };
    let exchange = async {
        tokio::try_join!(sender.send_share(message), receiver.recv_share())
    };
    let (_, received) = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| {
            error!("Share exchange did not complete within {:?}", timeout);
            InternalError::SessionTimeout
        })??;
    debug!(from = received.sequence, "Received peer share.");
    accept_share(sequence, received)
}

fn accept_share(sequence: i32, received: ShareMessage) -> Result<ShareBytes> {
    let expected = peer_sequence(sequence);
    if received.sequence != expected {
        return Err(InternalError::InvalidArgument(format!(
            "share from sequence {} while paired with {}",
            received.sequence, expected
        )));
    }
    let share: ShareBytes =
        received
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| InternalError::InvalidPayloadLength {
                expected: SHARE_LEN,
                actual: received.payload.len(),
            })?;
    let _ = fr_from_canonical_bytes(&share)?;
    Ok(share)
}

/// In-process transport: every listening address owns an unbounded channel.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<ShareMessage>>>>,
}

impl MemoryNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening on `address`, replacing any previous listener.
    pub fn listen(&self, address: &str) -> mpsc::UnboundedReceiver<ShareMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.inboxes.lock().insert(address.to_string(), sender);
        receiver
    }

    /// Stop listening on `address`.
    pub fn close(&self, address: &str) {
        let _ = self.inboxes.lock().remove(address);
    }
}

#[async_trait]
impl PeerConnector for MemoryNetwork {
    type Sender = mpsc::UnboundedSender<ShareMessage>;

    async fn connect(&self, peer_address: &str) -> Result<Self::Sender> {
        self.inboxes
            .lock()
            .get(peer_address)
            .cloned()
            .ok_or(InternalError::PeerDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sharing::{combine_leaf_pair, commit, reconstruct, split},
        utils::fr_to_bytes,
    };
    use rand::rngs::OsRng;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_peer_sequence() {
        assert_eq!(peer_sequence(1), 2);
        assert_eq!(peer_sequence(2), 1);
        assert_eq!(peer_sequence(5), 6);
        assert_eq!(peer_sequence(i32::MAX), i32::MIN);
        assert_eq!(peer_sequence(i32::MIN), i32::MAX);
    }

    #[tokio::test]
    async fn test_pair_exchanges_and_reconstructs() -> Result<()> {
        let network = MemoryNetwork::new();
        let mut alice_inbox = network.listen("alice");
        let mut bob_inbox = network.listen("bob");
        let mut to_bob = network.connect("bob").await?;
        let mut to_alice = network.connect("alice").await?;

        let alice = split(&commit("alice")?, &mut OsRng);
        let bob = split(&commit("bob")?, &mut OsRng);
        let (alice_out, bob_out) = (alice.outgoing(), bob.outgoing());

        let (from_bob, from_alice) = tokio::try_join!(
            exchange_shares(&mut to_bob, &mut alice_inbox, 5, &alice_out, TIMEOUT),
            exchange_shares(&mut to_alice, &mut bob_inbox, 6, &bob_out, TIMEOUT),
        )?;
        assert_eq!(from_bob, bob.outgoing());
        assert_eq!(from_alice, alice.outgoing());

        let alice_joint = reconstruct(&alice.retained(), &from_bob, 5);
        let bob_joint = reconstruct(&bob.retained(), &from_alice, 6);
        let (x_alice, x_bob) = combine_leaf_pair(&alice_joint, &bob_joint)?;
        assert_eq!(x_alice, fr_to_bytes(&commit("alice")?));
        assert_eq!(x_bob, fr_to_bytes(&commit("bob")?));
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() -> Result<()> {
        let network = MemoryNetwork::new();
        let mut inbox = network.listen("alice");
        let _peer_inbox = network.listen("bob");
        let mut to_bob = network.connect("bob").await?;

        let result = exchange_shares(
            &mut to_bob,
            &mut inbox,
            1,
            &[0u8; SHARE_LEN],
            Duration::from_millis(20),
        )
        .await;
        assert_eq!(result, Err(InternalError::SessionTimeout));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_or_departed_peer() -> Result<()> {
        let network = MemoryNetwork::new();
        assert_eq!(
            network.connect("nobody").await.err(),
            Some(InternalError::PeerDisconnected)
        );

        let mut inbox = network.listen("alice");
        let peer_inbox = network.listen("bob");
        let mut to_bob = network.connect("bob").await?;
        network.close("bob");
        drop(peer_inbox);
        let result = exchange_shares(&mut to_bob, &mut inbox, 1, &[0u8; SHARE_LEN], TIMEOUT).await;
        assert_eq!(result, Err(InternalError::PeerDisconnected));
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_or_malformed_share_is_rejected() -> Result<()> {
        let network = MemoryNetwork::new();
        let mut inbox = network.listen("alice");
        let _peer_inbox = network.listen("bob");
        let mut to_bob = network.connect("bob").await?;
        let mut to_alice = network.connect("alice").await?;

        to_alice
            .send_share(ShareMessage {
                sequence: 9,
                payload: vec![0u8; SHARE_LEN],
            })
            .await?;
        assert!(matches!(
            exchange_shares(&mut to_bob, &mut inbox, 1, &[0u8; SHARE_LEN], TIMEOUT).await,
            Err(InternalError::InvalidArgument(_))
        ));

        to_alice
            .send_share(ShareMessage {
                sequence: 2,
                payload: vec![0u8; 31],
            })
            .await?;
        assert_eq!(
            exchange_shares(&mut to_bob, &mut inbox, 1, &[0u8; SHARE_LEN], TIMEOUT).await,
            Err(InternalError::InvalidPayloadLength {
                expected: SHARE_LEN,
                actual: 31
            })
        );

        to_alice
            .send_share(ShareMessage {
                sequence: 2,
                payload: vec![0xff; SHARE_LEN],
            })
            .await?;
        assert_eq!(
            exchange_shares(&mut to_bob, &mut inbox, 1, &[0u8; SHARE_LEN], TIMEOUT).await,
            Err(InternalError::NonCanonicalFieldElement)
        );
        Ok(())
    }
}
