// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use serde::Deserialize;
use serde_json::json;
use std::{process::ExitCode, sync::Arc};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cwl_forwarder::{
    config::ForwarderConfig, credentials::CredentialsFactory, error::ForwarderError,
    logger::Formatter, pipeline::Forwarder,
};

/// The subscription event as delivered by the platform.
#[derive(Debug, Deserialize)]
struct SubscriptionEvent {
    awslogs: EncodedLogs,
}

#[derive(Debug, Deserialize)]
struct EncodedLogs {
    data: String,
}

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ForwarderConfig::from_env();
    init_logging(log_level(&config));

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => {
            println!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("FORWARDER | Batch failed: {e}");
            println!("{}", failure_report(&e));
            ExitCode::FAILURE
        }
    }
}

/// The validated level, or the default when configuration could not be loaded.
fn log_level(config: &Result<ForwarderConfig, ForwarderError>) -> &str {
    config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |config| config.log_level.as_str())
}

async fn run(config: ForwarderConfig) -> Result<String, ForwarderError> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .map_err(|e| ForwarderError::InvalidEvent(format!("failed to read input: {e}")))?;
    let event = parse_event(&input)?;

    let forwarder = Forwarder::new(config, Arc::new(CredentialsFactory::from_env()))?;
    let outcome = forwarder.handle(&event.awslogs.data).await?;
    info!("FORWARDER | Done: {outcome:?}");

    Ok(serde_json::to_string(&outcome).unwrap_or_default())
}

fn parse_event(input: &str) -> Result<SubscriptionEvent, ForwarderError> {
    serde_json::from_str(input).map_err(|e| ForwarderError::InvalidEvent(e.to_string()))
}

fn failure_report(error: &ForwarderError) -> serde_json::Value {
    match error {
        ForwarderError::BulkIndex { status, body } => json!({
            "error": "bulk request failed",
            "statusCode": status,
            "body": body,
        }),
        other => json!({ "error": other.to_string() }),
    }
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");
    let filter =
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_target(false)
        .without_time()
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shape() {
        let event = parse_event(r#"{"awslogs":{"data":"H4sIAAAAAAAAAw=="}}"#).unwrap();
        assert_eq!(event.awslogs.data, "H4sIAAAAAAAAAw==");
    }

    #[test]
    fn test_invalid_event_is_input_error() {
        for input in ["", "not json", r#"{"Records":[]}"#] {
            assert!(
                matches!(parse_event(input), Err(ForwarderError::InvalidEvent(_))),
                "input {input:?} should be rejected"
            );
        }
        let report = failure_report(&ForwarderError::InvalidEvent("missing field".into()));
        assert_eq!(
            report,
            json!({"error": "Invalid subscription event: missing field"})
        );
    }

    #[test]
    fn test_log_level_from_config() {
        let config = ForwarderConfig {
            search_endpoint: "search-logs.us-east-1.es.amazonaws.com".to_string(),
            log_level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(log_level(&Ok(config)), "debug");

        let missing = Err(ForwarderError::InvalidConfig("CWL_SEARCH_ENDPOINT is required".into()));
        assert_eq!(log_level(&missing), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_failure_report_carries_status() {
        let report = failure_report(&ForwarderError::BulkIndex {
            status: 403,
            body: json!({"message": "denied"}),
        });
        assert_eq!(report["statusCode"], json!(403));
        assert_eq!(report["body"]["message"], json!("denied"));
    }

    #[test]
    fn test_failure_report_for_transport() {
        let report = failure_report(&ForwarderError::Transport("connection refused".into()));
        assert_eq!(
            report,
            json!({"error": "Failed to reach endpoint: connection refused"})
        );
    }
}
