// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the forwarding pipeline.
//!
//! Errors fall in two groups. Fatal ones abort the batch and are returned from
//! [`crate::pipeline::Forwarder::handle`] as a [`ForwarderError`]. Local ones
//! ([`LineError`], [`MetricsPublishError`]) are logged where they happen and never
//! reach the caller.

use reqwest::StatusCode;
use serde_json::Value;

/// Failure to turn the inbound blob into a [`crate::batch::LogBatch`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a valid gzip stream: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("decompressed payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("decompressed payload is not a valid log batch: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single log line that looked like a metric carrier but could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("malformed custom metric line: {0}")]
    MalformedMetricLine(String),

    #[error("malformed report line: {0}")]
    MalformedReportLine(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("cannot derive region and service from host '{0}'")]
    InvalidHost(String),

    #[error("no signing credentials available")]
    MissingCredentials,

    #[error("invalid header value for '{0}'")]
    InvalidHeader(String),
}

/// Errors surfaced to the caller of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The invocation input is not a subscription event.
    #[error("Invalid subscription event: {0}")]
    InvalidEvent(String),

    #[error("Failed to decode batch: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to sign request: {0}")]
    SigningConfig(#[from] SigningError),

    /// The request never produced a response.
    #[error("Failed to reach endpoint: {0}")]
    Transport(String),

    /// A response was received and it reported failure.
    #[error("Bulk request failed with status {status}: {body}")]
    BulkIndex { status: u16, body: Value },
}

impl ForwarderError {
    /// Status code of the failed response, when one was received.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ForwarderError::BulkIndex { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure to publish one chunk of metrics. Always contained by the publisher.
#[derive(Debug, thiserror::Error)]
pub enum MetricsPublishError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Failed to sign metrics request: {0}")]
    Signing(#[from] SigningError),

    #[error("Failed to reach metrics endpoint: {0}")]
    Transport(String),

    #[error("Metrics endpoint rejected request: {0:?} {1}")]
    Destination(Option<StatusCode>, String),
}
