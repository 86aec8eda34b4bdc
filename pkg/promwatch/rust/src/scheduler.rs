// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, timer not armed yet.
    Idle,
    /// Timer armed, waiting for the next tick.
    Scheduled,
    /// Dispatching the registered queries.
    Firing,
    /// Shut down. Terminal.
    Stopped,
}

impl SchedulerState {
    #[cfg(test)]
    pub(crate) fn is_running(self) -> bool {
        matches!(self, SchedulerState::Scheduled | SchedulerState::Firing)
    }

    pub(crate) fn can_transition_to(self, next: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, next),
            (Idle, Scheduled)
                | (Scheduled, Firing)
                | (Firing, Scheduled)
                | (Idle, Stopped)
                | (Scheduled, Stopped)
                | (Firing, Stopped)
        )
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Scheduled => write!(f, "scheduled"),
            SchedulerState::Firing => write!(f, "firing"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Fixed-interval driver. Each tick calls a dispatch function that must only
/// enqueue work; the next tick fires on schedule whether or not earlier
/// requests have completed.
pub struct Scheduler {
    interval: Duration,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: SchedulerState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            warn!("scheduler: invalid transition {} -> {next}", *state);
            return false;
        }
        debug!("scheduler: {} -> {next}", *state);
        *state = next;
        true
    }

    /// Tick every `interval` (the first tick fires immediately) until
    /// `shutdown` resolves. A scheduler runs at most once.
    pub async fn run<F, S>(&self, mut dispatch: F, shutdown: S)
    where
        F: FnMut(),
        S: Future<Output = ()>,
    {
        if !self.transition(SchedulerState::Scheduled) {
            return;
        }
        info!("polling every {}s", self.interval.as_secs_f64());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.transition(SchedulerState::Firing);
                    dispatch();
                    self.transition(SchedulerState::Scheduled);
                }
                _ = &mut shutdown => break,
            }
        }

        self.transition(SchedulerState::Stopped);
        info!("polling stopped");
    }
}
