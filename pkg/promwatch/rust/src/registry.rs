// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::token::QueryToken;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    order: Vec<QueryToken>,
    members: HashSet<QueryToken>,
}

/// Working set of polled queries, in registration order.
///
/// Membership is keyed by exact token equality; two textually different but
/// semantically identical expressions are distinct entries.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    inner: Mutex<Inner>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No method panics while holding the lock.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `token` to the working set. Returns `true` only if it was not
    /// already registered. Empty expressions are refused.
    pub fn register(&self, token: QueryToken) -> bool {
        if token.is_empty() {
            debug!("refusing to register an empty expression");
            return false;
        }
        let mut inner = self.lock();
        if inner.members.contains(&token) {
            debug!("query already registered: {token}");
            return false;
        }
        info!("registered query: {token}");
        inner.members.insert(token.clone());
        inner.order.push(token);
        true
    }

    pub fn unregister(&self, token: &QueryToken) -> bool {
        let mut inner = self.lock();
        if !inner.members.remove(token) {
            return false;
        }
        inner.order.retain(|t| t != token);
        info!("unregistered query: {token}");
        true
    }

    pub fn contains(&self, token: &QueryToken) -> bool {
        self.lock().members.contains(token)
    }

    /// Copy of the working set for one tick.
    pub fn snapshot(&self) -> Vec<QueryToken> {
        self.lock().order.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
