// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! HTTP client for the Prometheus query API.

use crate::backoff::BackoffPolicy;
use crate::config::{ConnectionSettings, Settings};
use crate::errors::ClientError;
use crate::token::{QueryToken, TOKEN_HEADER};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::future::Future;
use std::time::Duration;

/// Source of raw query payloads.
///
/// Implemented by [`HttpQueryClient`]; the engine only depends on this trait
/// so a fake backend can stand in during tests.
pub trait MetricsBackend: Send + Sync + 'static {
    fn query_instant(
        &self,
        token: &QueryToken,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;

    fn query_range(
        &self,
        token: &QueryToken,
        range_secs: u64,
        step_secs: f64,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;

    fn fetch_label_values(&self) -> impl Future<Output = Result<String, ClientError>> + Send;
}

pub fn basic_auth_header(account: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{account}:{password}")))
}

pub fn instant_url(base: &str, expression: &str) -> String {
    format!(
        "{base}/api/v1/query?query={}",
        urlencoding::encode(expression)
    )
}

/// The step is written as an integer; fractional steps are truncated.
pub fn range_url(base: &str, expression: &str, start: i64, end: i64, step_secs: f64) -> String {
    format!(
        "{base}/api/v1/query_range?query={}&start={start}&end={end}&step={}",
        urlencoding::encode(expression),
        step_secs.trunc() as i64
    )
}

pub fn label_values_url(base: &str) -> String {
    format!("{base}/api/v1/label/__name__/values")
}

/// `(start, end)` for a window of `range_secs` ending at `now`.
pub fn range_bounds(now: i64, range_secs: u64) -> (i64, i64) {
    let range = i64::try_from(range_secs).unwrap_or(i64::MAX);
    (now.saturating_sub(range), now)
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Clone)]
pub struct HttpQueryClient {
    base_url: String,
    auth_header: String,
    retry: BackoffPolicy,
    client: reqwest::Client,
}

impl HttpQueryClient {
    pub fn new(
        connection: &ConnectionSettings,
        timeout: Duration,
        retry: BackoffPolicy,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: connection.base_url(),
            auth_header: basic_auth_header(&connection.account, &connection.password),
            retry,
            client,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        Self::new(
            &settings.connection,
            settings.request_timeout(),
            settings.retry,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: String, token: Option<&QueryToken>) -> Result<String, ClientError> {
        let attempts = self.retry.attempts();
        let mut backoff = self.retry.backoff();
        let mut attempt = 1;
        loop {
            match self.get_once(&url, token).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = backoff.next_delay();
                    debug!(
                        "{e}; retrying in {}ms (attempt {}/{attempts})",
                        delay.as_millis(),
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str, token: Option<&QueryToken>) -> Result<String, ClientError> {
        let mut request = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            // Expressions may hold characters that are not valid in a header value.
            request = request.header(
                TOKEN_HEADER,
                urlencoding::encode(&token.to_string()).into_owned(),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

impl MetricsBackend for HttpQueryClient {
    async fn query_instant(&self, token: &QueryToken) -> Result<String, ClientError> {
        let url = instant_url(&self.base_url, token.expression());
        self.get(url, Some(token)).await
    }

    async fn query_range(
        &self,
        token: &QueryToken,
        range_secs: u64,
        step_secs: f64,
    ) -> Result<String, ClientError> {
        let (start, end) = range_bounds(unix_now(), range_secs);
        let url = range_url(&self.base_url, token.expression(), start, end, step_secs);
        self.get(url, Some(token)).await
    }

    async fn fetch_label_values(&self) -> Result<String, ClientError> {
        let url = label_values_url(&self.base_url);
        self.get(url, None).await
    }
}
