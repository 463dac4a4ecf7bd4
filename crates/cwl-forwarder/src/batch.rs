// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Inbound batch envelope delivered by the log subscription.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "DATA_MESSAGE", alias = "DATA")]
    Data,
    /// Connectivity check sent by the log source; carries no events.
    #[serde(rename = "CONTROL_MESSAGE", alias = "CONTROL")]
    Control,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub message_type: MessageType,
    pub owner: String,
    pub log_group: String,
    pub log_stream: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscription_filters: Vec<String>,
    #[serde(default)]
    pub log_events: Vec<LogEvent>,
}

impl LogBatch {
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.message_type == MessageType::Control
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<BTreeMap<String, String>>,
}

/// Function identity shared by every line of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionContext {
    pub function_name: String,
    pub version: String,
}

impl FunctionContext {
    #[must_use]
    pub fn from_batch(batch: &LogBatch) -> Self {
        Self {
            function_name: parse_function_name(&batch.log_group).to_string(),
            version: parse_function_version(&batch.log_stream).to_string(),
        }
    }
}

/// Function name encoded in a log group such as `/aws/lambda/service-env-funcName`.
///
/// The last path segment is taken; when it follows the `<service>-<stage>-<function>`
/// deployment convention (at least three `-` separated parts) the service and stage
/// prefix is dropped.
///
/// # Examples
///
/// ```
/// use cwl_forwarder::batch::parse_function_name;
///
/// assert_eq!(parse_function_name("/aws/lambda/service-env-funcName"), "funcName");
/// assert_eq!(parse_function_name("/aws/lambda/svc-dev-place-order"), "place-order");
/// assert_eq!(parse_function_name("/aws/lambda/standalone"), "standalone");
/// assert_eq!(parse_function_name("/aws/lambda/get-index"), "get-index");
/// ```
#[must_use]
pub fn parse_function_name(log_group: &str) -> &str {
    let segment = log_group.rsplit('/').next().unwrap_or(log_group);
    let mut parts = segment.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(service), Some(stage), Some(function))
            if !service.is_empty() && !stage.is_empty() && !function.is_empty() =>
        {
            function
        }
        _ => segment,
    }
}

/// Version tag between the first `[` and the first `]` of a log stream name such as
/// `2016/08/17/[76]afe5c000d5344c33b5d88be7a4c55816`.
///
/// Returns an empty string when the stream carries no bracketed version.
#[must_use]
pub fn parse_function_version(log_stream: &str) -> &str {
    let Some(start) = log_stream.find('[') else {
        return "";
    };
    match log_stream[start + 1..].find(']') {
        Some(len) => &log_stream[start + 1..start + 1 + len],
        None => "",
    }
}
