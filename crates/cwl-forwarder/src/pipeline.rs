// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch orchestration: decode, classify every line, then index documents and
//! publish metrics side by side.

use crate::batch::{FunctionContext, LogBatch};
use crate::bulk::{BulkDocumentBuilder, BulkPayload};
use crate::bulk_publisher::{BulkPublisher, BulkSummary};
use crate::classifier::{classify, Classification, LifecycleMarker, ParsedLogRecord};
use crate::config::ForwarderConfig;
use crate::credentials::CredentialsFactory;
use crate::decoder::decode_batch;
use crate::error::ForwarderError;
use crate::http::get_client;
use crate::metric::MetricDatum;
use crate::metrics_publisher::{CloudWatchSink, MetricsPublisher, MetricsSink};
use crate::signer::RequestSigner;
use crate::usage::usage_metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything derived from one data batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub payload: BulkPayload,
    /// Not shipped; the bulk payload already indexes every line in full.
    pub records: Vec<ParsedLogRecord>,
    /// Custom metrics first, then usage metrics, each in line order.
    pub metrics: Vec<MetricDatum>,
}

/// Runs every line of `batch` through classification and document building.
///
/// Returns `None` for a control batch. Malformed metric and report lines are
/// logged and contribute no metrics; their documents are still indexed.
#[must_use]
pub fn transform(batch: &LogBatch, config: &ForwarderConfig) -> Option<Transformed> {
    let payload = BulkDocumentBuilder::new(config.index_prefix.as_str()).build(batch)?;
    let context = FunctionContext::from_batch(batch);

    let mut records = Vec::new();
    let mut custom = Vec::new();
    let mut usage = Vec::new();

    for event in &batch.log_events {
        match classify(event, batch, &context) {
            Ok(Classification::Record(record)) => records.push(record),
            Ok(Classification::CustomMetric(datum)) => custom.push(datum),
            Ok(Classification::Lifecycle(LifecycleMarker::Report)) => {
                match usage_metrics(&event.message, &context, config.price_per_gb_second) {
                    Ok(metrics) => usage.extend(metrics),
                    Err(e) => debug!("FORWARDER | Skipping line {}: {e}", event.id),
                }
            }
            Ok(Classification::Lifecycle(_)) => {}
            Err(e) => debug!("FORWARDER | Skipping line {}: {e}", event.id),
        }
    }

    custom.extend(usage);
    Some(Transformed {
        payload,
        records,
        metrics: custom,
    })
}

/// Successful end of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    ControlMessage,
    Indexed(BulkSummary),
}

pub struct Forwarder {
    config: ForwarderConfig,
    bulk_publisher: BulkPublisher,
    metrics_publisher: Option<MetricsPublisher>,
}

impl Forwarder {
    /// Builds the HTTP client, signer and publishers for `config`.
    pub fn new(
        config: ForwarderConfig,
        credentials_factory: Arc<CredentialsFactory>,
    ) -> Result<Self, ForwarderError> {
        config.validate()?;
        let client = get_client(&config);
        let signer = RequestSigner::new(credentials_factory);

        let bulk_publisher = BulkPublisher::new(&config, client.clone(), signer.clone())?;
        let metrics_publisher = config.metrics_enabled.then(|| {
            MetricsPublisher::new(Arc::new(CloudWatchSink::new(&config, client, signer)))
        });

        Ok(Self {
            config,
            bulk_publisher,
            metrics_publisher,
        })
    }

    /// Replaces the metrics destination, enabling metrics publishing.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_publisher = Some(MetricsPublisher::new(sink));
        self
    }

    /// Processes one encoded subscription payload.
    pub async fn handle(&self, encoded: &str) -> Result<Outcome, ForwarderError> {
        let batch = decode_batch(encoded)?;
        self.handle_batch(&batch).await
    }

    pub async fn handle_batch(&self, batch: &LogBatch) -> Result<Outcome, ForwarderError> {
        let Some(transformed) = transform(batch, &self.config) else {
            info!("FORWARDER | Received a control message");
            return Ok(Outcome::ControlMessage);
        };
        debug!(
            "FORWARDER | {} events from {}: {} records, {} metrics",
            batch.log_events.len(),
            batch.log_group,
            transformed.records.len(),
            transformed.metrics.len()
        );

        let publish_metrics = async {
            if let Some(publisher) = &self.metrics_publisher {
                publisher.publish(&transformed.metrics).await;
            }
        };
        let index_documents = async {
            if transformed.payload.is_empty() {
                return Ok(BulkSummary::default());
            }
            self.bulk_publisher.publish(&transformed.payload).await
        };

        let ((), indexed) = tokio::join!(publish_metrics, index_documents);
        let summary = indexed?;
        info!(
            "FORWARDER | Success: {}",
            serde_json::to_string(&summary).unwrap_or_default()
        );
        Ok(Outcome::Indexed(summary))
    }
}
