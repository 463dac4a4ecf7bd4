// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Canonical metric datum shared by custom, usage and accumulated metrics.

use crate::constants::MONITORING_PREFIX;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pre-aggregated samples, published in place of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticSet {
    pub sample_count: f64,
    pub sum: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl StatisticSet {
    #[must_use]
    pub fn from_sample(value: f64) -> Self {
        Self {
            sample_count: 1.0,
            sum: value,
            minimum: value,
            maximum: value,
        }
    }

    pub fn record(&mut self, value: f64) {
        self.sample_count += 1.0;
        self.sum += value;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub value: f64,
    pub statistics: Option<StatisticSet>,
    pub unit: String,
    pub name: String,
    pub dimensions: Vec<Dimension>,
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
}

impl MetricDatum {
    #[must_use]
    pub fn with_statistics(mut self, statistics: StatisticSet) -> Self {
        self.value = statistics.sum;
        self.statistics = Some(statistics);
        self
    }

    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Builds a datum, normalizing the unit with [`capitalize_first`] and stamping
/// the current time when no timestamp is given.
#[must_use]
pub fn make_metric(
    value: f64,
    unit: &str,
    name: impl Into<String>,
    dimensions: Vec<Dimension>,
    namespace: impl Into<String>,
    timestamp: Option<DateTime<Utc>>,
) -> MetricDatum {
    MetricDatum {
        value,
        statistics: None,
        unit: capitalize_first(unit),
        name: name.into(),
        dimensions,
        namespace: namespace.into(),
        timestamp: timestamp.unwrap_or_else(Utc::now),
    }
}

/// Upper-cases the first character and leaves the rest untouched.
///
/// Compound units are not handled: `bytes/second` becomes `Bytes/second`,
/// not the destination's `Bytes/Second`.
///
/// # Examples
///
/// ```
/// use cwl_forwarder::metric::capitalize_first;
///
/// assert_eq!(capitalize_first("count"), "Count");
/// assert_eq!(capitalize_first("bytes/second"), "Bytes/second");
/// ```
#[must_use]
pub fn capitalize_first(unit: &str) -> String {
    let mut chars = unit.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Renders a datum as the marker line the ingest side recognizes as a custom metric:
/// `MONITORING|<value>|<unit>|<name>|<namespace>[|k=v,k=v]`.
#[must_use]
pub fn format_marker(datum: &MetricDatum) -> String {
    let mut line = format!(
        "{MONITORING_PREFIX}{}|{}|{}|{}",
        datum.value,
        datum.unit.to_lowercase(),
        datum.name,
        datum.namespace
    );
    if !datum.dimensions.is_empty() {
        let dimensions = datum
            .dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect::<Vec<_>>()
            .join(",");
        line.push('|');
        line.push_str(&dimensions);
    }
    line
}
