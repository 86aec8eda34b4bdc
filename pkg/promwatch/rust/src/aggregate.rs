// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

/// One `(timestamp, value)` point. Timestamps are Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples of one result entry of a range query.
pub type Series = Vec<Sample>;

/// Collapse every series of a range query into one.
///
/// Samples are grouped by exact timestamp equality and averaged; the output
/// is sorted ascending and holds at most one sample per timestamp.
pub fn merge(series: &[Series]) -> Series {
    let mut samples: Vec<Sample> = series
        .iter()
        .flatten()
        .filter(|s| !s.timestamp.is_nan())
        .copied()
        .collect();
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut merged: Series = Vec::with_capacity(samples.len());
    let mut group: Option<(f64, f64, u32)> = None;
    for sample in samples {
        group = match group {
            Some((ts, sum, count)) if ts == sample.timestamp => {
                Some((ts, sum + sample.value, count + 1))
            }
            Some((ts, sum, count)) => {
                merged.push(Sample::new(ts, sum / f64::from(count)));
                Some((sample.timestamp, sample.value, 1))
            }
            None => Some((sample.timestamp, sample.value, 1)),
        };
    }
    if let Some((ts, sum, count)) = group {
        merged.push(Sample::new(ts, sum / f64::from(count)));
    }
    merged
}

/// Per-interval increase of a counter.
///
/// Each output sample carries the later timestamp of its pair; negative
/// deltas (counter resets) clamp to zero. Apply once, on a merged series.
pub fn counter_deltas(samples: &[Sample]) -> Series {
    samples
        .windows(2)
        .filter_map(|pair| match pair {
            [prev, next] => Some(Sample::new(
                next.timestamp,
                (next.value - prev.value).max(0.0),
            )),
            _ => None,
        })
        .collect()
}
