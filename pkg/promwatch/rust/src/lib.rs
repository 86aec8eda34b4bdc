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
#![cfg_attr(
    test,
    allow(
        clippy::indexing_slicing,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic
    )
)]

pub mod aggregate;
pub mod backoff;
pub mod catalog;
pub mod client;
pub mod config;
pub mod engine;
mod errors;
pub mod parser;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod token;

// Re-export the public API
pub use aggregate::{Sample, Series, counter_deltas, merge};
pub use catalog::{DisplayMode, QueryCatalog};
pub use client::{HttpQueryClient, MetricsBackend};
pub use config::Settings;
pub use engine::PromWatch;
pub use errors::{ClientError, ConfigError};
pub use parser::InstantResult;
pub use router::{Subscriber, SubscriberId};
pub use token::{Query, QueryKind, QueryToken};
