// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::backoff::BackoffPolicy;
use crate::catalog::DisplayMode;
use crate::errors::ConfigError;
use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/promwatch.yaml";
const DEFAULT_PORT: u16 = 9090;

const MEMORY_USAGE_QUERY: &str =
    "(1 - node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes) * 100";
const CPU_USAGE_QUERY: &str =
    "100 - (avg by(instance)(rate(node_cpu_seconds_total{ mode = \"idle\" } [1m] )) * 100)";

fn default_endpoint() -> String {
    "localhost".to_string()
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_range_window_secs() -> u64 {
    300
}

fn default_range_step_secs() -> f64 {
    5.0
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_mappings_path() -> PathBuf {
    PathBuf::from("promql_mappings.yaml")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_static_queries() -> Vec<StaticQuery> {
    vec![
        StaticQuery {
            description: "Memory".to_string(),
            expression: MEMORY_USAGE_QUERY.to_string(),
            mode: DisplayMode::UsagePercent,
        },
        StaticQuery {
            description: "CPU".to_string(),
            expression: CPU_USAGE_QUERY.to_string(),
            mode: DisplayMode::UsagePercent,
        },
    ]
}

/// Where and as whom to reach the backend.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    /// Host, `host:port`, or full URL. A bare host gets `http://` and port 9090.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_admin")]
    pub account: String,
    #[serde(default = "default_admin")]
    pub password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            account: default_admin(),
            password: default_admin(),
        }
    }
}

impl ConnectionSettings {
    /// All three fields must be non-blank, like the login form requires.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("endpoint", &self.endpoint),
            ("account", &self.account),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField { field });
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.contains("://") {
            return endpoint.to_string();
        }
        // A trailing `:N` is only a port when the host is not a bare IPv6
        // address; `::1` has no port, `[::1]:9091` does.
        let has_port = endpoint.rsplit_once(':').is_some_and(|(host, port)| {
            port.parse::<u16>().is_ok()
                && (!host.contains(':') || (host.starts_with('[') && host.ends_with(']')))
        });
        if has_port {
            format!("http://{endpoint}")
        } else if endpoint.contains(':') && !endpoint.starts_with('[') {
            format!("http://[{endpoint}]:{DEFAULT_PORT}")
        } else {
            format!("http://{endpoint}:{DEFAULT_PORT}")
        }
    }
}

/// A query polled for the whole process lifetime.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StaticQuery {
    pub description: String,
    pub expression: String,
    /// How results are rendered in the log.
    #[serde(default)]
    pub mode: DisplayMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_range_window_secs")]
    pub range_window_secs: u64,
    /// Fractional steps are accepted and truncated when the URL is built.
    #[serde(default = "default_range_step_secs")]
    pub range_step_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: BackoffPolicy,
    #[serde(default = "default_mappings_path")]
    pub mappings_path: PathBuf,
    #[serde(default = "default_static_queries")]
    pub static_queries: Vec<StaticQuery>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            poll_interval_secs: default_poll_interval_secs(),
            range_window_secs: default_range_window_secs(),
            range_step_secs: default_range_step_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: BackoffPolicy::default(),
            mappings_path: default_mappings_path(),
            static_queries: default_static_queries(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Unknown levels fall back to `info`.
    pub fn log_level(&self) -> log::Level {
        log::Level::from_str(self.log_level.trim()).unwrap_or_else(|_| {
            warn!("invalid log_level {:?}, using info", self.log_level);
            log::Level::Info
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "poll_interval_secs",
            });
        }
        if self.range_step_secs.trunc() < 1.0 {
            return Err(ConfigError::ZeroDuration {
                field: "range_step_secs",
            });
        }
        Ok(())
    }

    /// Apply `DD_PROMWATCH_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("DD_PROMWATCH_ENDPOINT") {
            self.connection.endpoint = endpoint;
        }
        if let Some(account) = lookup("DD_PROMWATCH_ACCOUNT") {
            self.connection.account = account;
        }
        if let Some(password) = lookup("DD_PROMWATCH_PASSWORD") {
            self.connection.password = password;
        }
        if let Some(level) = lookup("DD_PROMWATCH_LOG_LEVEL") {
            self.log_level = level;
        }
    }
}

pub fn config_path() -> PathBuf {
    std::env::var("DD_PROMWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load settings from `path`, falling back to defaults when the file does not
/// exist. Environment overrides are applied on top.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = if path.exists() {
        parse_settings(path)?
    } else {
        warn!(
            "config file not found at {}, using defaults",
            path.display()
        );
        Settings::default()
    };
    settings.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(settings)
}

fn parse_settings(path: &Path) -> Result<Settings> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(settings)
}
