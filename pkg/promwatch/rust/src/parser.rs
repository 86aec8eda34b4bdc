// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Decoding of the Prometheus HTTP API envelope.
//!
//! Nothing in here fails: malformed payloads degrade to [`InstantResult::Unavailable`]
//! or an empty list so the display layer always has something to show.

use crate::aggregate::{Sample, Series};
use crate::catalog::DisplayMode;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

const UNAVAILABLE: &str = "N/A";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Scalar outcome of an instant query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstantResult {
    Value(f64),
    /// No usable value; rendered as `N/A`.
    Unavailable,
}

impl InstantResult {
    pub fn value(self) -> Option<f64> {
        match self {
            InstantResult::Value(v) => Some(v),
            InstantResult::Unavailable => None,
        }
    }

    /// Three decimals, with a `%` suffix for percentage displays.
    pub fn formatted(self, mode: DisplayMode) -> String {
        match (self, mode) {
            (InstantResult::Value(v), DisplayMode::UsagePercent) => format!("{v:.3}%"),
            (InstantResult::Value(v), DisplayMode::Raw) => format!("{v:.3}"),
            (InstantResult::Unavailable, _) => UNAVAILABLE.to_string(),
        }
    }
}

impl fmt::Display for InstantResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstantResult::Value(v) => write!(f, "{v:.3}"),
            InstantResult::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

fn decode_envelope(payload: &str) -> Option<Envelope> {
    let envelope: Envelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("failed to parse backend response: {e}");
            return None;
        }
    };
    match envelope.status.as_deref() {
        Some("success") => {}
        status => warn!(
            "query returned non-success status: {} ({})",
            status.unwrap_or("<missing>"),
            envelope.error.as_deref().unwrap_or("no error message")
        ),
    }
    Some(envelope)
}

fn result_entries(envelope: &Envelope) -> Option<&Vec<Value>> {
    envelope.data.as_ref()?.get("result")?.as_array()
}

/// Locale-independent number decoding. Prometheus sends values as strings
/// (`"0.25"`, `"NaN"`, `"+Inf"`) and timestamps as numbers.
fn decode_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn decode_sample(pair: &Value) -> Option<Sample> {
    let pair = pair.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let timestamp = decode_number(pair.first()?)?;
    let value = decode_number(pair.get(1)?)?;
    Some(Sample::new(timestamp, value))
}

/// Value of the first result entry. Additional series are ignored.
pub fn parse_instant(payload: &str) -> InstantResult {
    let Some(envelope) = decode_envelope(payload) else {
        return InstantResult::Unavailable;
    };
    let value = result_entries(&envelope)
        .and_then(|results| results.first())
        .and_then(|first| first.get("value"))
        .and_then(Value::as_array)
        .and_then(|pair| pair.get(1));

    match value.and_then(decode_number) {
        Some(v) => InstantResult::Value(v),
        None => {
            debug!("instant response carried no usable value");
            InstantResult::Unavailable
        }
    }
}

/// One [`Series`] per result entry that has a `values` array.
pub fn parse_range(payload: &str) -> Vec<Series> {
    let Some(envelope) = decode_envelope(payload) else {
        return Vec::new();
    };
    let Some(results) = result_entries(&envelope) else {
        debug!("range response carried no result array");
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|entry| {
            let Some(values) = entry.get("values").and_then(Value::as_array) else {
                debug!("skipping range result entry without values");
                return None;
            };
            let series: Series = values.iter().filter_map(decode_sample).collect();
            if series.len() != values.len() {
                debug!(
                    "dropped {} undecodable sample(s)",
                    values.len() - series.len()
                );
            }
            Some(series)
        })
        .collect()
}

/// Metric names from `/api/v1/label/__name__/values`.
pub fn parse_label_values(payload: &str) -> Vec<String> {
    let Some(envelope) = decode_envelope(payload) else {
        return Vec::new();
    };
    envelope
        .data
        .as_ref()
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
