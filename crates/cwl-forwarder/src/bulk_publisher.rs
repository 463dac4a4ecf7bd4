// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Signed delivery of bulk payloads and interpretation of the per-item response.

use crate::bulk::BulkPayload;
use crate::config::ForwarderConfig;
use crate::constants::{BULK_PATH, BULK_RETRY_BACKOFF_MS};
use crate::error::ForwarderError;
use crate::signer::{RequestSigner, SigningScope, UnsignedRequest};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Item counts of an accepted bulk request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    #[serde(rename = "attemptedItems")]
    pub attempted: usize,
    #[serde(rename = "successfulItems")]
    pub successful: usize,
    #[serde(rename = "failedItems")]
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct BulkPublisher {
    client: reqwest::Client,
    signer: RequestSigner,
    scope: SigningScope,
    host: String,
    url: String,
    max_attempts: u32,
    log_failed_responses: bool,
}

impl BulkPublisher {
    /// Fails when the search endpoint does not name a region and service to sign for.
    pub fn new(
        config: &ForwarderConfig,
        client: reqwest::Client,
        signer: RequestSigner,
    ) -> Result<Self, ForwarderError> {
        let scope = SigningScope::from_host(&config.search_endpoint)?;
        Ok(Self {
            client,
            signer,
            scope,
            host: config.search_endpoint.clone(),
            url: format!("{}{BULK_PATH}", config.search_base_url()),
            max_attempts: config.bulk_max_attempts.max(1),
            log_failed_responses: config.log_failed_responses,
        })
    }

    pub async fn publish(&self, payload: &BulkPayload) -> Result<BulkSummary, ForwarderError> {
        let request = UnsignedRequest::post(&self.host, BULK_PATH, payload.body.clone())
            .with_header("Content-Type", "application/json");
        let signed = self.signer.sign(request, &self.scope).await?;
        let headers = signed.header_map()?;

        debug!(
            "BULK | Sending {} items ({} bytes) to {}",
            payload.items,
            signed.body.len(),
            self.url
        );
        let (status, text) = self.send(headers, signed.body).await?;
        info!("BULK | Response status {status}");

        interpret_response(status, &text, self.log_failed_responses)
    }

    /// Retries only while no response is obtained, with a linear backoff between
    /// attempts; any status ends the loop.
    async fn send(&self, headers: HeaderMap, body: String) -> Result<(u16, String), ForwarderError> {
        let time = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let resp = self
                .client
                .post(&self.url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            match resp {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp
                        .text()
                        .await
                        .map_err(|e| ForwarderError::Transport(e.to_string()))?;
                    return Ok((status, text));
                }
                Err(e) => {
                    if attempts >= self.max_attempts {
                        error!(
                            "BULK | Failed to send request after {} ms and {} attempts: {:?}",
                            time.elapsed().as_millis(),
                            attempts,
                            e
                        );
                        return Err(ForwarderError::Transport(e.to_string()));
                    }
                    let backoff_ms = BULK_RETRY_BACKOFF_MS * u64::from(attempts);
                    debug!("BULK | Attempt {attempts} failed, retrying in {backoff_ms} ms: {e}");
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

/// Reads a bulk response.
///
/// A status in `[200, 299)` with `errors` false or absent is a success; anything else
/// is a [`ForwarderError::BulkIndex`] whose body has the `items` array removed.
pub fn interpret_response(
    status: u16,
    text: &str,
    log_failed_responses: bool,
) -> Result<BulkSummary, ForwarderError> {
    let mut body: Value =
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));

    let items: &[Value] = body
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let failed_items: Vec<&Value> = items
        .iter()
        .filter(|item| item_status(item).is_some_and(|status| status >= 300))
        .collect();
    let summary = BulkSummary {
        attempted: items.len(),
        successful: items.len() - failed_items.len(),
        failed: failed_items.len(),
    };

    let errors = body.get("errors").and_then(Value::as_bool).unwrap_or(false);
    if (200..299).contains(&status) && !errors {
        info!(
            "BULK | Indexed {} of {} items",
            summary.successful, summary.attempted
        );
        return Ok(summary);
    }

    if log_failed_responses && !failed_items.is_empty() {
        error!(
            "BULK | Failed items: {}",
            serde_json::to_string_pretty(&failed_items).unwrap_or_default()
        );
    }

    if let Value::Object(map) = &mut body {
        map.remove("items");
    }
    error!("BULK | Request failed with status {status}: {body}");

    Err(ForwarderError::BulkIndex { status, body })
}

/// Status of a `{"<action>": {"status": ...}}` response item.
fn item_status(item: &Value) -> Option<u64> {
    item.as_object()?
        .values()
        .next()?
        .get("status")
        .and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn test_all_items_indexed() {
        let body = json!({
            "took": 3,
            "errors": false,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 200}}
            ]
        });
        let summary = interpret_response(200, &body.to_string(), false).unwrap();
        assert_eq!(
            summary,
            BulkSummary {
                attempted: 2,
                successful: 2,
                failed: 0
            }
        );
    }

    #[test]
    fn test_errors_flag_is_failure_without_items() {
        let body = json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]
        });
        let error = interpret_response(200, &body.to_string(), false).unwrap_err();
        let ForwarderError::BulkIndex { status, body } = error else {
            panic!("expected a bulk index error");
        };
        assert_eq!(status, 200);
        assert!(body.get("items").is_none());
        assert_eq!(body.get("errors"), Some(&json!(true)));
    }

    #[test]
    fn test_non_success_status() {
        let body = json!({"message": "The security token included in the request is invalid."});
        let error = interpret_response(403, &body.to_string(), false).unwrap_err();
        assert_eq!(error.status_code(), Some(403));
    }

    #[test]
    fn test_non_json_body() {
        let error = interpret_response(502, "Bad Gateway", false).unwrap_err();
        let ForwarderError::BulkIndex { body, .. } = error else {
            panic!("expected a bulk index error");
        };
        assert_eq!(body, json!("Bad Gateway"));
    }

    #[test]
    fn test_success_without_items() {
        let summary = interpret_response(200, "{}", false).unwrap();
        assert_eq!(summary, BulkSummary::default());
    }

    #[test]
    fn test_failed_item_counted_when_errors_absent() {
        let body = json!({"items": [
            {"index": {"status": 201}},
            {"create": {"status": 409}}
        ]});
        let summary = interpret_response(200, &body.to_string(), false).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.successful, 1);
    }

    #[test]
    #[traced_test]
    fn test_failed_items_logged_when_enabled() {
        let body = json!({
            "errors": true,
            "items": [{"index": {"_id": "doc-42", "status": 400}}]
        });
        let _ = interpret_response(200, &body.to_string(), true);
        assert!(logs_contain("Failed items"));
        assert!(logs_contain("doc-42"));
    }

    #[test]
    #[traced_test]
    fn test_failed_items_not_logged_by_default() {
        let body = json!({
            "errors": true,
            "items": [{"index": {"_id": "doc-42", "status": 400}}]
        });
        let _ = interpret_response(200, &body.to_string(), false);
        assert!(logs_contain("Request failed with status 200"));
        assert!(!logs_contain("doc-42"));
    }
}
