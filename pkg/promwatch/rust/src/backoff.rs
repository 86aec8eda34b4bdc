// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Deserialize;
use std::time::Duration;

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    2000
}

/// Bounded retry policy for a single backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackoffPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn backoff(&self) -> Backoff {
        let initial = Duration::from_millis(self.initial_backoff_ms.max(1));
        let max = Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms.max(1)));
        Backoff {
            current: initial,
            max,
        }
    }
}

/// Doubling delay, capped at the policy maximum.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_cap() {
        let policy = BackoffPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    }

    #[test]
    fn test_max_below_initial_is_raised() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(BackoffPolicy::none().attempts(), 1);
    }

    #[test]
    fn test_deserialize_defaults() {
        let policy: BackoffPolicy = serde_yaml::from_str("max_attempts: 4\n").unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff_ms, 250);
        assert_eq!(policy.max_backoff_ms, 2000);
    }
}
