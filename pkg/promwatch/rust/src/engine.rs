// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The polling engine: one instance per process, shared by `Arc`.
//!
//! Every request runs in its own task and reports back through the
//! [`ResponseRouter`]. Nothing here waits for a previous request before
//! issuing the next one; stale answers are sorted out by token matching.

use crate::aggregate::merge;
use crate::catalog::{DisplayMode, QueryCatalog};
use crate::client::MetricsBackend;
use crate::config::Settings;
use crate::parser::{parse_instant, parse_label_values, parse_range};
use crate::registry::QueryRegistry;
use crate::router::{ResponseRouter, Subscriber, SubscriberId};
use crate::scheduler::{Scheduler, SchedulerState};
use crate::token::{Query, QueryToken};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct MetricsCache {
    names: Option<Arc<Vec<String>>>,
    fetching: bool,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn new(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct PromWatch<B: MetricsBackend> {
    backend: Arc<B>,
    catalog: QueryCatalog,
    registry: QueryRegistry,
    router: ResponseRouter,
    scheduler: Scheduler,
    /// Tokens registered through `register_query`, which are never released.
    /// Every ownership change (owner update, registration, release) happens
    /// while this lock is held.
    ownership: Mutex<HashSet<QueryToken>>,
    metrics: Mutex<MetricsCache>,
    in_flight: Arc<InFlight>,
    range_window_secs: u64,
    range_step_secs: f64,
}

impl<B: MetricsBackend> PromWatch<B> {
    pub fn new(backend: B, catalog: QueryCatalog, settings: &Settings) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(backend),
            catalog,
            registry: QueryRegistry::new(),
            router: ResponseRouter::new(),
            scheduler: Scheduler::new(settings.poll_interval()),
            ownership: Mutex::new(HashSet::new()),
            metrics: Mutex::new(MetricsCache::default()),
            in_flight: Arc::new(InFlight::default()),
            range_window_secs: settings.range_window_secs,
            range_step_secs: settings.range_step_secs,
        })
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn registered(&self) -> Vec<QueryToken> {
        self.registry.snapshot()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn subscribe(&self, id: SubscriberId, sink: Arc<dyn Subscriber>) -> bool {
        self.router.subscribe(id, sink)
    }

    /// Drop the subscriber. Its query leaves the rotation unless another
    /// subscriber still owns it.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let pinned = lock(&self.ownership);
        if !self.router.is_subscribed(id) {
            return false;
        }
        if let Some(token) = self.router.unsubscribe(id) {
            self.release(&pinned, &token);
        }
        true
    }

    /// Add a query to the periodic rotation for the process lifetime.
    /// Returns `None` for an empty expression.
    pub fn register_query(&self, expression: &str) -> Option<QueryToken> {
        let token = QueryToken::new(expression);
        if token.is_empty() {
            return None;
        }
        let mut pinned = lock(&self.ownership);
        pinned.insert(token.clone());
        self.registry.register(token.clone());
        Some(token)
    }

    /// Make `expression` the current query of `subscriber` and fire it
    /// immediately. Results for the subscriber's earlier queries are
    /// discarded from now on.
    pub fn register_dynamic_query(
        self: &Arc<Self>,
        subscriber: SubscriberId,
        description: &str,
        expression: &str,
    ) -> Option<QueryToken> {
        self.register_owned(subscriber, description, expression, false)
    }

    /// Resolve `metric`/`mode` through the catalog and make it the current
    /// query of `subscriber`. `Raw` counters are delivered as deltas.
    pub fn select_metric(
        self: &Arc<Self>,
        subscriber: SubscriberId,
        metric: &str,
        mode: DisplayMode,
    ) -> Option<QueryToken> {
        let expression = self.catalog.resolve_or_derive(metric, mode);
        let counter_raw = mode == DisplayMode::Raw && QueryCatalog::is_counter(metric);
        self.register_owned(subscriber, mode.as_str(), &expression, counter_raw)
    }

    fn register_owned(
        self: &Arc<Self>,
        subscriber: SubscriberId,
        description: &str,
        expression: &str,
        counter_raw: bool,
    ) -> Option<QueryToken> {
        let token = QueryToken::with_disambiguator(expression, description);
        if token.is_empty() {
            debug!("{subscriber}: no query available for {description:?}");
            return None;
        }

        {
            let pinned = lock(&self.ownership);
            if !self.router.is_subscribed(subscriber) {
                warn!("{subscriber} is not subscribed, ignoring query {token}");
                return None;
            }
            let previous = self
                .router
                .set_last_token(subscriber, token.clone(), counter_raw);
            self.registry.register(token.clone());
            if let Some(previous) = previous.filter(|previous| *previous != token) {
                self.release(&pinned, &previous);
            }
        }

        self.fire(&token);
        Some(token)
    }

    /// Caller holds the ownership lock, passed in as `pinned`.
    fn release(&self, pinned: &HashSet<QueryToken>, token: &QueryToken) {
        if self.router.owners(token) > 0 || pinned.contains(token) {
            return;
        }
        self.registry.unregister(token);
    }

    /// Ask for the backend's metric names. The first successful answer is
    /// cached for the process lifetime; every request gets exactly one
    /// notification, cached or not.
    pub fn request_metric_discovery(self: &Arc<Self>, subscriber: SubscriberId) -> bool {
        if !self.router.request_discovery(subscriber) {
            return false;
        }

        let cached = {
            let mut cache = lock(&self.metrics);
            match &cache.names {
                Some(names) => Some(Arc::clone(names)),
                None if cache.fetching => return true,
                None => {
                    cache.fetching = true;
                    None
                }
            }
        };

        match cached {
            Some(names) => {
                debug!("serving {} metric name(s) from cache", names.len());
                self.router.on_metrics_ready(&names);
            }
            None => {
                let engine = Arc::clone(self);
                self.spawn_tracked(async move { engine.fetch_metric_names().await });
            }
        }
        true
    }

    async fn fetch_metric_names(&self) {
        let names = match self.backend.fetch_label_values().await {
            Ok(payload) => parse_label_values(&payload),
            Err(e) => {
                warn!("metric discovery failed: {e}");
                lock(&self.metrics).fetching = false;
                return;
            }
        };

        info!("discovered {} metric name(s)", names.len());
        let names = Arc::new(names);
        {
            let mut cache = lock(&self.metrics);
            cache.fetching = false;
            // An empty answer is delivered but not cached, so a later request
            // tries again.
            if !names.is_empty() {
                cache.names = Some(Arc::clone(&names));
            }
        }
        self.router.on_metrics_ready(&names);
    }

    /// One-off range query for `token`, delivered like a scheduled one.
    pub fn request_range_query(
        self: &Arc<Self>,
        token: &QueryToken,
        range_secs: u64,
        step_secs: f64,
    ) {
        if token.is_empty() {
            return;
        }
        let engine = Arc::clone(self);
        let query = Query::range(token.clone());
        self.spawn_tracked(async move { engine.run_range(query, range_secs, step_secs).await });
    }

    /// Fire every registered query once (instant and range) without waiting
    /// for any of them. Returns the number of queries fired.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(self: &Arc<Self>) -> usize {
        let tokens = self.registry.snapshot();
        for token in &tokens {
            self.fire(token);
        }
        debug!("tick fired {} query(ies)", tokens.len());
        tokens.len()
    }

    /// Tick on the configured interval until `shutdown` resolves.
    pub async fn run<S>(self: &Arc<Self>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        self.scheduler
            .run(
                || {
                    self.tick();
                },
                shutdown,
            )
            .await;
    }

    /// Wait until every request issued so far has completed.
    pub async fn settle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn fire(self: &Arc<Self>, token: &QueryToken) {
        let engine = Arc::clone(self);
        let query = Query::instant(token.clone());
        self.spawn_tracked(async move { engine.run_instant(query).await });

        self.request_range_query(token, self.range_window_secs, self.range_step_secs);
    }

    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = InFlightGuard::new(&self.in_flight);
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    async fn run_instant(&self, query: Query) {
        match self.backend.query_instant(&query.token).await {
            Ok(payload) => {
                let result = parse_instant(&payload);
                self.router.on_instant_response(&query.token, result);
            }
            Err(e) => warn!("{query} failed: {e}"),
        }
    }

    async fn run_range(&self, query: Query, range_secs: u64, step_secs: f64) {
        match self
            .backend
            .query_range(&query.token, range_secs, step_secs)
            .await
        {
            Ok(payload) => {
                let merged = merge(&parse_range(&payload));
                self.router.on_range_response(&query.token, &merged);
            }
            Err(e) => warn!("{query} failed: {e}"),
        }
    }
}
