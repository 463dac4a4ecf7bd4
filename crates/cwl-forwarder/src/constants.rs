// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire limits and fixed names used across the pipeline.

/// Hard cap on datums per metrics publish request.
pub const MAX_METRICS_PER_REQUEST: usize = 20;

/// Namespace under which invocation usage metrics are published.
pub const USAGE_METRICS_NAMESPACE: &str = "AWS/Lambda";

/// Platform compute price at the time the cost formula was written.
pub const DEFAULT_PRICE_PER_GB_SECOND: f64 = 0.000_016_67;

pub const DEFAULT_INDEX_PREFIX: &str = "cwl";

/// Dimension names always set by the forwarder; custom markers cannot override them.
pub const FUNCTION_DIMENSION: &str = "Function";
pub const VERSION_DIMENSION: &str = "Version";

pub const START_PREFIX: &str = "START RequestId";
pub const END_PREFIX: &str = "END RequestId";
pub const REPORT_PREFIX: &str = "REPORT RequestId";
/// The summary line proper; `REPORT_PREFIX` without the colon only marks lifecycle lines.
pub const REPORT_SUMMARY_PREFIX: &str = "REPORT RequestId:";

pub const MONITORING_PREFIX: &str = "MONITORING|";

pub const BULK_PATH: &str = "/_bulk";

/// Wait before the n-th bulk retry is n times this.
pub const BULK_RETRY_BACKOFF_MS: u64 = 100;

pub const RECORD_TYPE: &str = "cloudwatch";

pub const DEFAULT_LEVEL: &str = "debug";

pub(crate) const PUT_METRIC_DATA_TARGET: &str = "GraniteServiceVersion20100801.PutMetricData";
pub(crate) const METRICS_SERVICE: &str = "monitoring";
pub(crate) const AWS_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
