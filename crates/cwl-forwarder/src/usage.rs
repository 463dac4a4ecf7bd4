// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Usage and cost metrics derived from the platform's end-of-invocation summary:
//!
//! ```text
//! REPORT RequestId: 3897a7c2-8ac6-11e7-8e57-bb793172ae75\tDuration: 2.89 ms\tBilled Duration: 100 ms \tMemory Size: 1024 MB\tMax Memory Used: 20 MB\t
//! ```

use crate::batch::FunctionContext;
use crate::classifier::base_dimensions;
use crate::constants::{REPORT_SUMMARY_PREFIX, USAGE_METRICS_NAMESPACE};
use crate::error::LineError;
use crate::metric::{make_metric, MetricDatum};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BILLED_DURATION_REGEX: Regex =
        Regex::new(r"(?i)Billed Duration: (.*) ms").expect("failed creating regex");
    static ref MEMORY_SIZE_REGEX: Regex =
        Regex::new(r"(?i)Memory Size: (.*) MB").expect("failed creating regex");
    static ref MAX_MEMORY_USED_REGEX: Regex =
        Regex::new(r"(?i)Max Memory Used: (.*) MB").expect("failed creating regex");
}

/// Figures read from a summary line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvocationReport {
    pub billed_duration_ms: f64,
    pub memory_size_mb: f64,
    pub max_memory_used_mb: f64,
}

impl InvocationReport {
    #[must_use]
    pub fn is_summary_line(message: &str) -> bool {
        message.starts_with(REPORT_SUMMARY_PREFIX)
    }

    /// Reads the three labeled figures from their fixed tab positions (third, fourth
    /// and fifth field).
    pub fn parse(message: &str) -> Result<Self, LineError> {
        let parts: Vec<&str> = message.split('\t').take(5).collect();
        Ok(Self {
            billed_duration_ms: labeled_value(&BILLED_DURATION_REGEX, &parts, 2, "Billed Duration")?,
            memory_size_mb: labeled_value(&MEMORY_SIZE_REGEX, &parts, 3, "Memory Size")?,
            max_memory_used_mb: labeled_value(
                &MAX_MEMORY_USED_REGEX,
                &parts,
                4,
                "Max Memory Used",
            )?,
        })
    }

    /// Invocation cost in dollars, rounded to 9 decimal places.
    #[must_use]
    pub fn cost(&self, price_per_gb_second: f64) -> f64 {
        invocation_cost(price_per_gb_second, self.memory_size_mb, self.billed_duration_ms)
    }
}

fn labeled_value(
    regex: &Regex,
    parts: &[&str],
    position: usize,
    label: &str,
) -> Result<f64, LineError> {
    let part = parts.get(position).copied().unwrap_or_default();
    let captured = regex
        .captures(part)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| LineError::MalformedReportLine(format!("missing '{label}'")))?;
    captured.as_str().trim().parse::<f64>().map_err(|_| {
        LineError::MalformedReportLine(format!(
            "non-numeric '{label}' value '{}'",
            captured.as_str()
        ))
    })
}

/// `price × (memory / 1024) × (billed / 1000)`, rounded to 9 decimal places.
///
/// Rounding works on the decimal expansion of the exact product, so a product
/// stored just below a half step rounds down.
///
/// # Examples
///
/// ```
/// use cwl_forwarder::usage::invocation_cost;
///
/// assert_eq!(invocation_cost(0.00001667, 128.0, 1100.0), 0.000002292);
/// ```
#[must_use]
pub fn invocation_cost(price_per_gb_second: f64, memory_size_mb: f64, billed_duration_ms: f64) -> f64 {
    let raw = price_per_gb_second * (memory_size_mb / 1024.0) * (billed_duration_ms / 1000.0);
    format!("{raw:.9}").parse::<f64>().unwrap_or(raw)
}

/// Derives the four usage metrics when `message` is a summary line; otherwise none.
///
/// `CostInDollars` is published with the `milliseconds` unit.
pub fn usage_metrics(
    message: &str,
    context: &FunctionContext,
    price_per_gb_second: f64,
) -> Result<Vec<MetricDatum>, LineError> {
    if !InvocationReport::is_summary_line(message) {
        return Ok(Vec::new());
    }

    let report = InvocationReport::parse(message)?;
    let dimensions = base_dimensions(context);
    let metric = |value: f64, unit: &str, name: &str| {
        make_metric(
            value,
            unit,
            name,
            dimensions.clone(),
            USAGE_METRICS_NAMESPACE,
            None,
        )
    };

    Ok(vec![
        metric(report.billed_duration_ms, "milliseconds", "BilledDuration"),
        metric(report.memory_size_mb, "megabytes", "MemorySize"),
        metric(report.max_memory_used_mb, "megabytes", "MemoryUsed"),
        metric(report.cost(price_per_gb_second), "milliseconds", "CostInDollars"),
    ])
}
