// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Barrier sessions and the per-group registry that owns them.
//!
//! A [`Barrier`] collects contributions keyed by contributor until it holds
//! `expected` of them. The insertion that completes it receives the
//! contributions in arrival order and is responsible for computing and
//! publishing the outcome; every waiter then reads the same outcome from a
//! `watch` channel. The lock only guards the contribution list and the
//! count check, never the computation or the wait.
//!
//! The registry retires a session as soon as it completes, so the next
//! contribution for the group opens a fresh one. The most recently retired
//! session is kept so that a contributor whose wait expired can still
//! collect its outcome.

use crate::errors::{InternalError, Result};
use parking_lot::Mutex;
use std::{collections::HashMap, hash::Hash, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, trace};

/// The outcome of an insertion into a [`Barrier`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission<V> {
    /// The contribution was recorded and more are needed.
    Accepted,
    /// The contributor is already present, or the session is complete; the
    /// contribution was ignored.
    Ignored,
    /// This contribution completed the session. The caller must compute the
    /// outcome from these values and publish it.
    Complete(Vec<V>),
}

#[derive(Debug)]
struct BarrierState<K, V> {
    entries: Vec<(K, V)>,
    ready: bool,
}

/// A one-shot barrier over `expected` distinct contributors.
#[derive(Debug)]
pub(crate) struct Barrier<K, V, T> {
    expected: usize,
    state: Mutex<BarrierState<K, V>>,
    outcome: watch::Sender<Option<Result<T>>>,
}

impl<K, V, T> Barrier<K, V, T>
where
    K: Eq + Hash + Clone,
    V: Clone,
    T: Clone,
{
    pub(crate) fn new(expected: usize) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            expected,
            state: Mutex::new(BarrierState {
                entries: Vec::with_capacity(expected),
                ready: false,
            }),
            outcome,
        }
    }

    /// Subscribe to the outcome. Subscribing after publication still
    /// observes it.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Result<T>>> {
        self.outcome.subscribe()
    }

    /// Record `value` for `key` unless `key` already contributed.
    pub(crate) fn insert(&self, key: K, value: V) -> Admission<V> {
        let mut state = self.state.lock();
        if state.ready || state.entries.iter().any(|(k, _)| *k == key) {
            return Admission::Ignored;
        }
        state.entries.push((key, value));
        trace!(
            arrived = state.entries.len(),
            expected = self.expected,
            "Contribution recorded."
        );
        if state.entries.len() < self.expected {
            return Admission::Accepted;
        }
        state.ready = true;
        Admission::Complete(state.entries.iter().map(|(_, v)| v.clone()).collect())
    }

    /// Publish the outcome to every current and future subscriber.
    pub(crate) fn publish(&self, outcome: Result<T>) {
        let _ = self.outcome.send_replace(Some(outcome));
    }

    /// Whether `key` contributed to this session.
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.iter().any(|(k, _)| k == key)
    }

    pub(crate) fn arrived(&self) -> usize {
        self.state.lock().entries.len()
    }
}

/// Wait for a published outcome for at most `timeout`.
///
/// Expiry is [`InternalError::Cancelled`] and leaves the session untouched.
pub(crate) async fn wait_outcome<T: Clone>(
    mut receiver: watch::Receiver<Option<Result<T>>>,
    timeout: Duration,
) -> Result<T> {
    let waited = tokio::time::timeout(timeout, async move {
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| InternalError::InternalInvariantFailed)?;
        let outcome: Option<Result<T>> = (*outcome).clone();
        outcome.ok_or(InternalError::InternalInvariantFailed)
    })
    .await;
    match waited {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => Err(e),
        Err(_) => Err(InternalError::Cancelled),
    }
}

#[derive(Debug)]
struct Sessions<K, V, T> {
    live: HashMap<u64, Arc<Barrier<K, V, T>>>,
    retired: HashMap<u64, Arc<Barrier<K, V, T>>>,
}

/// Live sessions keyed by group, plus the last completed session of each
/// group.
#[derive(Debug)]
pub(crate) struct SessionRegistry<K, V, T> {
    sessions: Mutex<Sessions<K, V, T>>,
}

impl<K, V, T> Default for SessionRegistry<K, V, T> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(Sessions {
                live: HashMap::new(),
                retired: HashMap::new(),
            }),
        }
    }
}

impl<K, V, T> SessionRegistry<K, V, T>
where
    K: Eq + Hash + Clone,
    V: Clone,
    T: Clone,
{
    /// Contribute `value` for `key` to the group's session and return the
    /// session whose outcome the caller should wait for.
    ///
    /// A key that belongs to the last completed session of the group is
    /// pointed back at that session and its value is ignored. Otherwise the
    /// value goes to the live session, which is opened on first use and
    /// retired by the contribution that completes it.
    pub(crate) fn admit(
        &self,
        group: u64,
        expected: usize,
        key: K,
        value: V,
    ) -> (Arc<Barrier<K, V, T>>, Admission<V>) {
        let mut sessions = self.sessions.lock();
        if let Some(retired) = sessions.retired.get(&group) {
            if retired.contains(&key) {
                return (retired.clone(), Admission::Ignored);
            }
        }
        let session = sessions
            .live
            .entry(group)
            .or_insert_with(|| {
                debug!(group, expected, "Opening session.");
                Arc::new(Barrier::new(expected))
            })
            .clone();
        let admission = session.insert(key, value);
        if let Admission::Complete(_) = admission {
            let _ = sessions.live.remove(&group);
            let _ = sessions.retired.insert(group, session.clone());
            debug!(group, "Session ready, retired from the registry.");
        }
        (session, admission)
    }

    /// The live session of `group`, if any.
    pub(crate) fn get(&self, group: u64) -> Option<Arc<Barrier<K, V, T>>> {
        self.sessions.lock().live.get(&group).cloned()
    }

    /// Whether `group` has a session still collecting contributions.
    pub(crate) fn contains(&self, group: u64) -> bool {
        self.get(group).is_some()
    }
}
