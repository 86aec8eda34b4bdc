// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Metric + display mode to PromQL lookup.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const CPU_USAGE_TEMPLATE: &str = "sum by (instance) (rate({metric}{mode!=\"idle\"}[1m])) * 100";
const MEMORY_USAGE_EXPRESSION: &str =
    "(1 - node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes) * 100";

/// Parsed from the labels `"Raw"` and `"Usage%"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum DisplayMode {
    /// The metric as the backend reports it.
    Raw,
    /// A derived percentage.
    #[default]
    UsagePercent,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Raw => "Raw",
            DisplayMode::UsagePercent => "Usage%",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "Raw" => Ok(DisplayMode::Raw),
            "Usage%" => Ok(DisplayMode::UsagePercent),
            other => Err(format!("unknown display mode: {other}")),
        }
    }
}

impl TryFrom<String> for DisplayMode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only `metric -> mode -> expression` table, loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct QueryCatalog {
    mappings: HashMap<String, HashMap<String, String>>,
}

impl QueryCatalog {
    /// Load the catalog from a YAML file.
    ///
    /// A missing or malformed file yields an empty catalog; callers fall back
    /// to the derived expressions of [`QueryCatalog::resolve_or_derive`].
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(
                "query mappings not found at {}, using built-in expressions only",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|contents| Self::from_yaml_str(&contents))
        {
            Ok(catalog) => {
                info!(
                    "loaded {} metric mapping(s) from {}",
                    catalog.len(),
                    path.display()
                );
                catalog
            }
            Err(e) => {
                warn!("ignoring query mappings: {e:#}");
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let mappings: HashMap<String, HashMap<String, String>> =
            serde_yaml::from_str(contents).context("parsing query mappings")?;
        Ok(Self { mappings })
    }

    /// Plain lookup. Returns an empty string when the pair is unknown, which
    /// callers treat as "do not query".
    pub fn resolve(&self, metric: &str, mode: &str) -> String {
        self.mappings
            .get(metric)
            .and_then(|modes| modes.get(mode))
            .cloned()
            .unwrap_or_default()
    }

    /// Lookup with the built-in heuristics as fallback.
    ///
    /// Metric families are detected by case-sensitive substring match, `cpu`
    /// before `memory`.
    pub fn resolve_or_derive(&self, metric: &str, mode: DisplayMode) -> String {
        let mapped = self.resolve(metric, mode.as_str());
        if !mapped.is_empty() {
            return mapped;
        }

        let derived = match mode {
            DisplayMode::Raw => metric.to_string(),
            DisplayMode::UsagePercent if metric.contains("cpu") => {
                CPU_USAGE_TEMPLATE.replace("{metric}", metric)
            }
            DisplayMode::UsagePercent if metric.contains("memory") => {
                MEMORY_USAGE_EXPRESSION.to_string()
            }
            DisplayMode::UsagePercent => String::new(),
        };
        debug!("derived expression for {metric} ({mode}): {derived:?}");
        derived
    }

    /// Prometheus counters end in `_total`.
    pub fn is_counter(metric: &str) -> bool {
        metric.ends_with("_total")
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
