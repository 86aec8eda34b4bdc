// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Delivery of completed responses to the subscribers that asked for them.
//!
//! A response is only accepted by a subscriber whose last-issued token equals
//! the response token. Anything else is stale (the subscriber has since moved
//! on to another query) and is dropped without complaint.

use crate::aggregate::{Sample, counter_deltas};
use crate::parser::InstantResult;
use crate::token::QueryToken;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Receiver of query results. All callbacks default to no-ops.
pub trait Subscriber: Send + Sync {
    fn on_instant_result(&self, _token: &QueryToken, _result: InstantResult) {}

    fn on_range_result(&self, _token: &QueryToken, _samples: &[Sample]) {}

    fn on_metrics_discovered(&self, _names: &[String]) {}
}

struct Subscription {
    sink: Arc<dyn Subscriber>,
    last_token: Option<QueryToken>,
    /// Range results are turned into clamped deltas before delivery.
    counter_raw: bool,
}

#[derive(Default)]
struct RouterState {
    subscriptions: HashMap<SubscriberId, Subscription>,
    pending_discovery: Vec<SubscriberId>,
}

#[derive(Default)]
pub struct ResponseRouter {
    state: Mutex<RouterState>,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if `id` is already bound; the existing sink is kept.
    pub fn subscribe(&self, id: SubscriberId, sink: Arc<dyn Subscriber>) -> bool {
        let mut state = self.lock();
        if state.subscriptions.contains_key(&id) {
            debug!("{id} already bound");
            return false;
        }
        state.subscriptions.insert(
            id,
            Subscription {
                sink,
                last_token: None,
                counter_raw: false,
            },
        );
        true
    }

    /// Remove the subscriber and return the token it last issued.
    pub fn unsubscribe(&self, id: SubscriberId) -> Option<QueryToken> {
        let mut state = self.lock();
        state.pending_discovery.retain(|pending| *pending != id);
        state
            .subscriptions
            .remove(&id)
            .and_then(|subscription| subscription.last_token)
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.lock().subscriptions.contains_key(&id)
    }

    /// Record the token `id` now owns. Returns the previous one.
    pub fn set_last_token(
        &self,
        id: SubscriberId,
        token: QueryToken,
        counter_raw: bool,
    ) -> Option<QueryToken> {
        let mut state = self.lock();
        let subscription = state.subscriptions.get_mut(&id)?;
        subscription.counter_raw = counter_raw;
        subscription.last_token.replace(token)
    }

    #[cfg(test)]
    pub(crate) fn last_token(&self, id: SubscriberId) -> Option<QueryToken> {
        self.lock()
            .subscriptions
            .get(&id)
            .and_then(|subscription| subscription.last_token.clone())
    }

    /// Number of subscribers currently owning `token`.
    pub fn owners(&self, token: &QueryToken) -> usize {
        self.lock()
            .subscriptions
            .values()
            .filter(|subscription| subscription.last_token.as_ref() == Some(token))
            .count()
    }

    fn matching(&self, token: &QueryToken) -> Vec<(Arc<dyn Subscriber>, bool)> {
        self.lock()
            .subscriptions
            .values()
            .filter(|subscription| subscription.last_token.as_ref() == Some(token))
            .map(|subscription| (Arc::clone(&subscription.sink), subscription.counter_raw))
            .collect()
    }

    /// Deliver an instant result. Returns how many subscribers accepted it.
    pub fn on_instant_response(&self, token: &QueryToken, result: InstantResult) -> usize {
        let targets = self.matching(token);
        if targets.is_empty() {
            debug!("discarding instant result for {token}: no current owner");
        }
        for (sink, _) in &targets {
            sink.on_instant_result(token, result);
        }
        targets.len()
    }

    /// Deliver an aggregated range result. Returns how many subscribers
    /// accepted it.
    pub fn on_range_response(&self, token: &QueryToken, samples: &[Sample]) -> usize {
        let targets = self.matching(token);
        if targets.is_empty() {
            debug!("discarding range result for {token}: no current owner");
            return 0;
        }

        let mut deltas: Option<Vec<Sample>> = None;
        for (sink, counter_raw) in &targets {
            if *counter_raw {
                let deltas = deltas.get_or_insert_with(|| counter_deltas(samples));
                sink.on_range_result(token, deltas);
            } else {
                sink.on_range_result(token, samples);
            }
        }
        targets.len()
    }

    /// Queue a discovery request for `id`. Each request is answered exactly
    /// once by [`ResponseRouter::on_metrics_ready`].
    pub fn request_discovery(&self, id: SubscriberId) -> bool {
        let mut state = self.lock();
        if !state.subscriptions.contains_key(&id) {
            debug!("ignoring discovery request from unknown {id}");
            return false;
        }
        state.pending_discovery.push(id);
        true
    }

    #[cfg(test)]
    pub(crate) fn pending_discovery(&self) -> usize {
        self.lock().pending_discovery.len()
    }

    /// Answer every queued discovery request. Returns the number of
    /// notifications sent.
    pub fn on_metrics_ready(&self, names: &[String]) -> usize {
        let targets: Vec<Arc<dyn Subscriber>> = {
            let mut state = self.lock();
            let pending = std::mem::take(&mut state.pending_discovery);
            pending
                .into_iter()
                .filter_map(|id| {
                    state
                        .subscriptions
                        .get(&id)
                        .map(|subscription| Arc::clone(&subscription.sink))
                })
                .collect()
        };
        for sink in &targets {
            sink.on_metrics_discovered(names);
        }
        targets.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct Recorder {
        pub instants: Mutex<Vec<(QueryToken, InstantResult)>>,
        pub ranges: Mutex<Vec<(QueryToken, Vec<Sample>)>>,
        pub discoveries: Mutex<Vec<Vec<String>>>,
    }

    impl Subscriber for Recorder {
        fn on_instant_result(&self, token: &QueryToken, result: InstantResult) {
            self.instants.lock().unwrap().push((token.clone(), result));
        }

        fn on_range_result(&self, token: &QueryToken, samples: &[Sample]) {
            self.ranges
                .lock()
                .unwrap()
                .push((token.clone(), samples.to_vec()));
        }

        fn on_metrics_discovered(&self, names: &[String]) {
            self.discoveries.lock().unwrap().push(names.to_vec());
        }
    }

    fn bound(router: &ResponseRouter, id: u64) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        assert!(router.subscribe(SubscriberId(id), recorder.clone()));
        recorder
    }

    #[test]
    fn test_stale_token_is_discarded() {
        let router = ResponseRouter::new();
        let recorder = bound(&router, 1);
        let t1 = QueryToken::new("node_load1");
        let t2 = QueryToken::new("node_load5");

        router.set_last_token(SubscriberId(1), t1.clone(), false);
        router.set_last_token(SubscriberId(1), t2.clone(), false);

        assert_eq!(router.on_instant_response(&t2, InstantResult::Value(2.0)), 1);
        assert_eq!(router.on_instant_response(&t1, InstantResult::Value(1.0)), 0);

        let instants = recorder.instants.lock().unwrap();
        assert_eq!(*instants, vec![(t2, InstantResult::Value(2.0))]);
    }

    #[test]
    fn test_broadcast_to_all_owners() {
        let router = ResponseRouter::new();
        let a = bound(&router, 1);
        let b = bound(&router, 2);
        let c = bound(&router, 3);
        let token = QueryToken::new("up");
        router.set_last_token(SubscriberId(1), token.clone(), false);
        router.set_last_token(SubscriberId(2), token.clone(), false);
        router.set_last_token(SubscriberId(3), QueryToken::new("down"), false);

        assert_eq!(router.owners(&token), 2);
        assert_eq!(router.on_instant_response(&token, InstantResult::Unavailable), 2);
        assert_eq!(a.instants.lock().unwrap().len(), 1);
        assert_eq!(b.instants.lock().unwrap().len(), 1);
        assert!(c.instants.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disambiguated_tokens_do_not_collide() {
        let router = ResponseRouter::new();
        let raw = bound(&router, 1);
        let usage = bound(&router, 2);
        let raw_token = QueryToken::with_disambiguator("up", "Raw");
        let usage_token = QueryToken::with_disambiguator("up", "Usage%");
        router.set_last_token(SubscriberId(1), raw_token.clone(), false);
        router.set_last_token(SubscriberId(2), usage_token, false);

        router.on_instant_response(&raw_token, InstantResult::Value(1.0));
        assert_eq!(raw.instants.lock().unwrap().len(), 1);
        assert!(usage.instants.lock().unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let router = ResponseRouter::new();
        let first = bound(&router, 7);
        let second = Arc::new(Recorder::default());
        assert!(!router.subscribe(SubscriberId(7), second.clone()));

        let token = QueryToken::new("up");
        router.set_last_token(SubscriberId(7), token.clone(), false);
        router.on_instant_response(&token, InstantResult::Value(1.0));
        assert_eq!(first.instants.lock().unwrap().len(), 1);
        assert!(second.instants.lock().unwrap().is_empty());
    }

    #[test]
    fn test_range_counter_raw_gets_deltas() {
        let router = ResponseRouter::new();
        let counter = bound(&router, 1);
        let plain = bound(&router, 2);
        let token = QueryToken::with_disambiguator("node_network_receive_bytes_total", "Raw");
        router.set_last_token(SubscriberId(1), token.clone(), true);
        router.set_last_token(SubscriberId(2), token.clone(), false);

        let samples = vec![
            Sample::new(0.0, 100.0),
            Sample::new(1.0, 150.0),
            Sample::new(2.0, 120.0),
        ];
        assert_eq!(router.on_range_response(&token, &samples), 2);

        let counter_ranges = counter.ranges.lock().unwrap();
        assert_eq!(
            counter_ranges[0].1,
            vec![Sample::new(1.0, 50.0), Sample::new(2.0, 0.0)]
        );
        assert_eq!(plain.ranges.lock().unwrap()[0].1, samples);
    }

    #[test]
    fn test_unsubscribe_returns_owned_token() {
        let router = ResponseRouter::new();
        bound(&router, 1);
        let token = QueryToken::new("up");
        router.set_last_token(SubscriberId(1), token.clone(), false);
        router.request_discovery(SubscriberId(1));

        assert_eq!(router.unsubscribe(SubscriberId(1)), Some(token.clone()));
        assert!(!router.is_subscribed(SubscriberId(1)));
        assert_eq!(router.pending_discovery(), 0);
        assert_eq!(router.on_instant_response(&token, InstantResult::Value(1.0)), 0);
        assert_eq!(router.unsubscribe(SubscriberId(1)), None);
    }

    #[test]
    fn test_set_last_token_unknown_subscriber() {
        let router = ResponseRouter::new();
        assert_eq!(
            router.set_last_token(SubscriberId(9), QueryToken::new("up"), false),
            None
        );
        assert_eq!(router.last_token(SubscriberId(9)), None);
    }

    #[test]
    fn test_discovery_answered_once_per_request() {
        let router = ResponseRouter::new();
        let a = bound(&router, 1);
        let b = bound(&router, 2);
        assert!(router.request_discovery(SubscriberId(1)));
        assert!(router.request_discovery(SubscriberId(1)));
        assert!(router.request_discovery(SubscriberId(2)));
        assert!(!router.request_discovery(SubscriberId(3)));

        let names = vec!["up".to_string()];
        assert_eq!(router.on_metrics_ready(&names), 3);
        assert_eq!(router.on_metrics_ready(&names), 0);
        assert_eq!(a.discoveries.lock().unwrap().len(), 2);
        assert_eq!(b.discoveries.lock().unwrap().len(), 1);
    }
}
