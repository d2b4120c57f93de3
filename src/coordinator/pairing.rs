// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The pending-registration queue.

use crate::messages::MatchResponse;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[derive(Debug)]
struct PendingRegistration {
    ticket: u64,
    address: String,
    reply: oneshot::Sender<MatchResponse>,
}

/// Registrations waiting for a partner, oldest first.
///
/// Each pairing takes the two oldest entries and hands them the next two
/// sequence numbers. Replies are written into their oneshot channels before
/// the caller releases the queue's lock, so a registration that is no longer
/// in the queue always has its reply waiting.
#[derive(Debug, Default)]
pub(crate) struct PairingQueue {
    waiting: VecDeque<PendingRegistration>,
    counter: i32,
    next_ticket: u64,
}

impl PairingQueue {
    /// Add `address` to the queue and pair the two oldest entries if
    /// possible.
    pub(crate) fn enqueue(&mut self, address: String) -> (u64, oneshot::Receiver<MatchResponse>) {
        let (reply, receiver) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiting.push_back(PendingRegistration {
            ticket,
            address,
            reply,
        });

        // Callers that went away without withdrawing cannot be paired.
        self.waiting.retain(|pending| !pending.reply.is_closed());

        while self.waiting.len() >= 2 {
            let (first, second) = match (self.waiting.pop_front(), self.waiting.pop_front()) {
                (Some(first), Some(second)) => (first, second),
                _ => break,
            };
            let first_sequence = self.counter.wrapping_add(1);
            let second_sequence = self.counter.wrapping_add(2);
            self.counter = self.counter.wrapping_add(2);
            info!(
                "Paired {} and {} with sequence numbers {} and {}",
                first.address, second.address, first_sequence, second_sequence
            );

            let first_reply = MatchResponse {
                peer_address: second.address,
                peer_sequence: first_sequence,
            };
            let second_reply = MatchResponse {
                peer_address: first.address,
                peer_sequence: second_sequence,
            };
            let first_sent = first.reply.send(first_reply).is_ok();
            let second_sent = second.reply.send(second_reply).is_ok();
            if !(first_sent && second_sent) {
                warn!("A paired registration was dropped before its reply was delivered");
            }
        }
        (ticket, receiver)
    }

    /// Remove a still-pending registration. Returns `false` if it has already
    /// been paired.
    pub(crate) fn withdraw(&mut self, ticket: u64) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|pending| pending.ticket != ticket);
        before != self.waiting.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }
}
