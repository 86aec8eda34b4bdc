// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use dd_promwatch::config::{self, StaticQuery};
use dd_promwatch::{
    DisplayMode, HttpQueryClient, InstantResult, PromWatch, QueryCatalog, QueryToken, Sample,
    Subscriber, SubscriberId,
};
use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};

#[derive(Parser, Debug)]
#[command(name = "dd-promwatch", version, about = "Polls a Prometheus server")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "DD_PROMWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Fire every query once, wait for the answers and exit
    #[arg(long)]
    once: bool,

    /// Print the server's metric names and exit
    #[arg(long, conflicts_with = "once")]
    discover: bool,
}

/// Logs every result of one static query.
struct LogSubscriber {
    description: String,
    mode: DisplayMode,
}

impl LogSubscriber {
    fn new(query: &StaticQuery) -> Self {
        Self {
            description: query.description.clone(),
            mode: query.mode,
        }
    }

    fn instant_line(&self, result: InstantResult) -> String {
        format!("{}: {}", self.description, result.formatted(self.mode))
    }
}

impl Subscriber for LogSubscriber {
    fn on_instant_result(&self, _token: &QueryToken, result: InstantResult) {
        info!("{}", self.instant_line(result));
    }

    fn on_range_result(&self, _token: &QueryToken, samples: &[Sample]) {
        info!("{}: {} point(s) in range", self.description, samples.len());
    }
}

#[derive(Default)]
struct NameCollector {
    names: Mutex<Vec<String>>,
}

impl Subscriber for NameCollector {
    fn on_metrics_discovered(&self, names: &[String]) {
        if let Ok(mut collected) = self.names.lock() {
            *collected = names.to_vec();
        }
    }
}

fn watch_static_queries(engine: &Arc<PromWatch<HttpQueryClient>>, queries: &[StaticQuery]) {
    for (index, query) in (1_u64..).zip(queries) {
        let id = SubscriberId(index);
        engine.subscribe(id, Arc::new(LogSubscriber::new(query)));
        if engine
            .register_dynamic_query(id, &query.description, &query.expression)
            .is_none()
        {
            warn!("skipping static query {:?}: empty expression", query.description);
        }
    }
}

async fn discover(engine: &Arc<PromWatch<HttpQueryClient>>) -> Result<()> {
    let collector = Arc::new(NameCollector::default());
    engine.subscribe(SubscriberId(0), collector.clone());
    engine.request_metric_discovery(SubscriberId(0));
    engine.settle().await;

    let names = collector
        .names
        .lock()
        .map(|names| names.clone())
        .unwrap_or_default();
    let mut stdout = std::io::stdout().lock();
    for name in &names {
        writeln!(stdout, "{name}").context("failed to write metric names")?;
    }
    info!("{} metric name(s) discovered", names.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(config::config_path);
    let settings = config::load_settings(&config_path)?;
    simple_logger::init_with_level(settings.log_level())?;
    info!(
        "dd-promwatch starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    settings.validate().context("invalid configuration")?;
    let catalog = QueryCatalog::load(&settings.mappings_path);
    let client = HttpQueryClient::from_settings(&settings).context("failed to build HTTP client")?;
    info!("querying {}", client.base_url());
    let engine = PromWatch::new(client, catalog, &settings);

    if args.discover {
        return discover(&engine).await;
    }

    watch_static_queries(&engine, &settings.static_queries);

    if args.once {
        engine.settle().await;
        info!("dd-promwatch done");
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    };

    engine.run(shutdown).await;
    info!("dd-promwatch shutting down");
    Ok(())
}
