// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

/// Failure of a single request against the metrics backend.
///
/// These never reach subscribers: the engine logs them and the affected
/// query simply misses a beat until the next tick.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl ClientError {
    /// Transport errors and server-side failures are worth another attempt;
    /// client errors (4xx) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Build(_) => false,
            ClientError::Transport { .. } => true,
            ClientError::Status { status, .. } => *status >= 500,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connection field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("`{field}` must be greater than zero")]
    ZeroDuration { field: &'static str },
}
