// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-line classification of function log output.
//!
//! A function log line looks like
//! `2017-04-26T10:41:09.023Z\tdb95c6da-2a6c-11e7-9550-c91b65931beb\tloading index.html...\n`
//! and is one of:
//!
//! - a lifecycle marker written by the platform (`START`, `END`, `REPORT`),
//! - a custom metric marker (`MONITORING|<value>|<unit>|<name>|...`),
//! - a structured JSON record,
//! - free text.

use crate::batch::{FunctionContext, LogBatch, LogEvent};
use crate::constants::{
    DEFAULT_LEVEL, END_PREFIX, FUNCTION_DIMENSION, MONITORING_PREFIX, RECORD_TYPE, REPORT_PREFIX,
    START_PREFIX, VERSION_DIMENSION,
};
use crate::error::LineError;
use crate::metric::{make_metric, Dimension, MetricDatum};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleMarker {
    Start,
    End,
    Report,
}

impl LifecycleMarker {
    #[must_use]
    pub fn detect(message: &str) -> Option<Self> {
        if message.starts_with(START_PREFIX) {
            Some(Self::Start)
        } else if message.starts_with(END_PREFIX) {
            Some(Self::End)
        } else if message.starts_with(REPORT_PREFIX) {
            Some(Self::Report)
        } else {
            None
        }
    }
}

/// The tab separated head of a function log line.
///
/// Only the first two tabs split; anything after them belongs to the event text.
/// A line with fewer than two tabs is all event text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTokens<'a> {
    pub timestamp: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub event: &'a str,
}

impl<'a> LineTokens<'a> {
    #[must_use]
    pub fn split(message: &'a str) -> Self {
        let mut parts = message.splitn(3, '\t');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(timestamp), Some(request_id), Some(event)) => Self {
                timestamp: Some(timestamp),
                request_id: Some(request_id),
                event,
            },
            _ => Self {
                timestamp: None,
                request_id: None,
                event: message,
            },
        }
    }

    fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Fields of a `MONITORING|...` line.
///
/// The metric name and the namespace are both read from the fourth field. A
/// writer's separate namespace field lands among the dimension candidates and is
/// dropped there because it carries no `=`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomMetricMarker<'a> {
    pub value: f64,
    pub unit: &'a str,
    pub name: &'a str,
    pub namespace: &'a str,
    pub dimensions: Vec<Dimension>,
}

impl<'a> CustomMetricMarker<'a> {
    pub fn parse(event: &'a str) -> Result<Self, LineError> {
        let fields: Vec<&str> = event.trim_end().split('|').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(LineError::MalformedMetricLine(format!(
                "expected at least 4 fields, got {}",
                fields.len()
            )));
        }

        let value = fields[1]
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| {
                LineError::MalformedMetricLine(format!("non-numeric value '{}'", fields[1]))
            })?;

        let dimensions = fields[4..]
            .iter()
            .flat_map(|group| group.split(','))
            .filter_map(|pair| {
                let kv: Vec<&str> = pair.trim().split('=').collect();
                match kv.as_slice() {
                    [name, value] => Some(Dimension::new(*name, *value)),
                    _ => None,
                }
            })
            .filter(|d| d.name != FUNCTION_DIMENSION && d.name != VERSION_DIMENSION)
            .collect();

        Ok(Self {
            value,
            unit: fields[2],
            name: fields[3],
            namespace: fields[3],
            dimensions,
        })
    }
}

/// Searchable record produced from a structured or free-text line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLogRecord {
    pub log_group: String,
    pub log_stream: String,
    pub function_name: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub level: String,
    pub message: Value,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Lifecycle(LifecycleMarker),
    CustomMetric(MetricDatum),
    Record(ParsedLogRecord),
}

/// Classifies one event of `batch`.
///
/// Only a malformed custom metric marker is an error; the caller skips that line.
pub fn classify(
    event: &LogEvent,
    batch: &LogBatch,
    context: &FunctionContext,
) -> Result<Classification, LineError> {
    if let Some(marker) = LifecycleMarker::detect(&event.message) {
        return Ok(Classification::Lifecycle(marker));
    }

    let tokens = LineTokens::split(&event.message);
    if tokens.event.starts_with(MONITORING_PREFIX) {
        let marker = CustomMetricMarker::parse(tokens.event)?;
        return Ok(Classification::CustomMetric(custom_metric(
            marker,
            context,
            tokens.parsed_timestamp(),
        )));
    }

    Ok(Classification::Record(parse_record(
        event, &tokens, batch, context,
    )))
}

fn custom_metric(
    marker: CustomMetricMarker<'_>,
    context: &FunctionContext,
    timestamp: Option<DateTime<Utc>>,
) -> MetricDatum {
    let mut dimensions = base_dimensions(context);
    dimensions.extend(marker.dimensions);
    make_metric(
        marker.value,
        marker.unit,
        marker.name,
        dimensions,
        marker.namespace,
        timestamp,
    )
}

/// `Function` and `Version`, present on every metric derived from a batch.
#[must_use]
pub fn base_dimensions(context: &FunctionContext) -> Vec<Dimension> {
    vec![
        Dimension::new(FUNCTION_DIMENSION, context.function_name.as_str()),
        Dimension::new(VERSION_DIMENSION, context.version.as_str()),
    ]
}

fn parse_record(
    event: &LogEvent,
    tokens: &LineTokens<'_>,
    batch: &LogBatch,
    context: &FunctionContext,
) -> ParsedLogRecord {
    let timestamp = tokens
        .parsed_timestamp()
        .unwrap_or_else(|| event_time(event.timestamp));

    let (level, message, fields) = match serde_json::from_str::<Value>(tokens.event) {
        Ok(Value::Object(mut fields)) => {
            let level = match fields.remove("level") {
                Some(Value::String(level)) => level.to_lowercase(),
                _ => DEFAULT_LEVEL.to_string(),
            };
            let message = fields.remove("message").unwrap_or(Value::Null);
            if let Some(request_id) = tokens.request_id {
                fields.insert(
                    "requestId".to_string(),
                    Value::String(request_id.to_string()),
                );
            }
            (level, message, fields)
        }
        _ => (
            DEFAULT_LEVEL.to_string(),
            Value::String(tokens.event.to_string()),
            Map::new(),
        ),
    };

    ParsedLogRecord {
        log_group: batch.log_group.clone(),
        log_stream: batch.log_stream.clone(),
        function_name: context.function_name.clone(),
        version: context.version.clone(),
        timestamp,
        record_type: RECORD_TYPE.to_string(),
        level,
        message,
        fields,
    }
}

/// Converts an event's epoch milliseconds, clamping values chrono cannot represent to the epoch.
#[must_use]
pub fn event_time(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}
