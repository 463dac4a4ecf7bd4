// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process metric recording for functions that report their own metrics.
//!
//! A [`MetricsAccumulator`] either buffers counts and timings until they are
//! drained or flushed, or, in [`EmitMode::Markers`], writes each recording as a
//! `MONITORING|...` line for the log forwarder to pick up.

use crate::metric::{format_marker, make_metric, Dimension, MetricDatum, StatisticSet};
use crate::metrics_publisher::{MetricsPublisher, PublishReport};
use std::collections::BTreeMap;
use std::env;
use std::future::Future;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, warn};

pub enum EmitMode {
    Buffered,
    Markers(Box<dyn Write + Send>),
}

impl std::fmt::Debug for EmitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitMode::Buffered => write!(f, "Buffered"),
            EmitMode::Markers(_) => write!(f, "Markers"),
        }
    }
}

#[derive(Debug)]
pub struct MetricsAccumulator {
    namespace: String,
    dimensions: Vec<Dimension>,
    counts: BTreeMap<String, f64>,
    timings: BTreeMap<String, StatisticSet>,
    mode: EmitMode,
}

impl MetricsAccumulator {
    /// Empty values are left out of the base dimensions.
    pub fn new(namespace: impl Into<String>, function: &str, version: &str, stage: &str) -> Self {
        let dimensions = [("Function", function), ("Version", version), ("Stage", stage)]
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| Dimension::new(name, value))
            .collect();
        Self {
            namespace: namespace.into(),
            dimensions,
            counts: BTreeMap::new(),
            timings: BTreeMap::new(),
            mode: EmitMode::Buffered,
        }
    }

    /// Base dimensions from the function's execution environment.
    pub fn from_env(namespace: impl Into<String>) -> Self {
        let var = |key: &str| env::var(key).unwrap_or_default();
        Self::new(
            namespace,
            &var("AWS_LAMBDA_FUNCTION_NAME"),
            &var("AWS_LAMBDA_FUNCTION_VERSION"),
            &var("STAGE"),
        )
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EmitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn incr_count(&mut self, name: &str, count: f64) {
        if self.emit_marker(count, "count", name) {
            return;
        }
        *self.counts.entry(name.to_string()).or_insert(0.0) += count;
    }

    /// Records one duration sample. Zero and non-finite durations are ignored.
    pub fn record_time_millis(&mut self, name: &str, millis: f64) {
        if millis == 0.0 || !millis.is_finite() {
            return;
        }
        debug!("METRICS | new execution time for [{name}] : {millis} milliseconds");

        if self.emit_marker(millis, "milliseconds", name) {
            return;
        }
        match self.timings.get_mut(name) {
            Some(stats) => stats.record(millis),
            None => {
                self.timings
                    .insert(name.to_string(), StatisticSet::from_sample(millis));
            }
        }
    }

    /// Runs `f` and records how long it took under `name`.
    pub fn track_exec_time<T, F>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        self.record_time_millis(name, elapsed_millis(start));
        result
    }

    /// Awaits `fut` and records how long it took under `name`.
    pub async fn track_exec_time_async<F>(&mut self, name: &str, fut: F) -> F::Output
    where
        F: Future,
    {
        let start = Instant::now();
        let result = fut.await;
        self.record_time_millis(name, elapsed_millis(start));
        result
    }

    /// Returns everything recorded so far and empties the accumulator.
    pub fn drain(&mut self) -> Vec<MetricDatum> {
        let counts = std::mem::take(&mut self.counts);
        let timings = std::mem::take(&mut self.timings);

        let mut datums: Vec<MetricDatum> = counts
            .into_iter()
            .map(|(name, count)| {
                make_metric(
                    count,
                    "Count",
                    name,
                    self.dimensions.clone(),
                    self.namespace.as_str(),
                    None,
                )
            })
            .collect();
        datums.extend(timings.into_iter().map(|(name, stats)| {
            make_metric(
                stats.sum,
                "Milliseconds",
                name,
                self.dimensions.clone(),
                self.namespace.as_str(),
                None,
            )
            .with_statistics(stats)
        }));
        datums
    }

    /// Discards everything recorded so far without publishing.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.timings.clear();
    }

    /// Drains and publishes. Failures are logged by the publisher.
    pub async fn flush(&mut self, publisher: &MetricsPublisher) -> PublishReport {
        let datums = self.drain();
        if datums.is_empty() {
            return PublishReport::default();
        }
        let names = datums
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        debug!("METRICS | flushing [{}] metrics: {names}", datums.len());
        publisher.publish(&datums).await
    }

    fn emit_marker(&mut self, value: f64, unit: &str, name: &str) -> bool {
        let EmitMode::Markers(writer) = &mut self.mode else {
            return false;
        };
        let datum = make_metric(
            value,
            unit,
            name,
            self.dimensions.clone(),
            self.namespace.as_str(),
            None,
        );
        if let Err(e) = writeln!(writer, "{}", format_marker(&datum)) {
            warn!("METRICS | Failed to write metric marker for [{name}]: {e}");
        }
        true
    }
}

fn elapsed_millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
