// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Best-effort metrics publishing.
//!
//! Metrics are grouped by namespace and sent in chunks of at most
//! [`MAX_METRICS_PER_REQUEST`]. Chunks of one namespace go out in order, one after
//! another; namespaces are published concurrently. A failed chunk is logged and
//! skipped, it never fails the batch.

use crate::config::ForwarderConfig;
use crate::constants::{
    AWS_JSON_CONTENT_TYPE, MAX_METRICS_PER_REQUEST, METRICS_SERVICE, PUT_METRIC_DATA_TARGET,
};
use crate::error::MetricsPublishError;
use crate::metric::{Dimension, MetricDatum, StatisticSet};
use crate::signer::{RequestSigner, SigningScope, UnsignedRequest};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricDataRequest {
    pub namespace: String,
    pub metric_data: Vec<MetricDataEntry>,
}

/// A datum as the destination expects it. Exactly one of `value` and
/// `statistic_values` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataEntry {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistic_values: Option<StatisticSet>,
}

impl From<&MetricDatum> for MetricDataEntry {
    fn from(datum: &MetricDatum) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let timestamp = datum.timestamp.timestamp_millis() as f64 / 1000.0;
        Self {
            metric_name: datum.name.clone(),
            dimensions: datum.dimensions.clone(),
            timestamp,
            unit: datum.unit.clone(),
            value: match datum.statistics {
                Some(_) => None,
                None => Some(datum.value),
            },
            statistic_values: datum.statistics,
        }
    }
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put_metric_data(
        &self,
        request: &PutMetricDataRequest,
    ) -> Result<(), MetricsPublishError>;
}

/// What a publish call achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub requests: usize,
    pub failed_requests: usize,
    pub published_metrics: usize,
}

#[derive(Clone)]
pub struct MetricsPublisher {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsPublisher {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub async fn publish(&self, metrics: &[MetricDatum]) -> PublishReport {
        if metrics.is_empty() {
            return PublishReport::default();
        }

        let groups = group_by_namespace(metrics);
        debug!(
            "METRICS | Publishing {} metrics in {} namespaces",
            metrics.len(),
            groups.len()
        );

        let reports = join_all(
            groups
                .into_iter()
                .map(|(namespace, datums)| self.publish_namespace(namespace, datums)),
        )
        .await;

        reports
            .into_iter()
            .fold(PublishReport::default(), |total, report| PublishReport {
                requests: total.requests + report.requests,
                failed_requests: total.failed_requests + report.failed_requests,
                published_metrics: total.published_metrics + report.published_metrics,
            })
    }

    async fn publish_namespace(
        &self,
        namespace: &str,
        datums: Vec<&MetricDatum>,
    ) -> PublishReport {
        let mut report = PublishReport::default();
        for chunk in datums.chunks(MAX_METRICS_PER_REQUEST) {
            let request = PutMetricDataRequest {
                namespace: namespace.to_string(),
                metric_data: chunk.iter().map(|datum| MetricDataEntry::from(*datum)).collect(),
            };
            report.requests += 1;
            match self.sink.put_metric_data(&request).await {
                Ok(()) => report.published_metrics += chunk.len(),
                Err(e) => {
                    report.failed_requests += 1;
                    error!("METRICS | Failed to publish metrics for namespace {namespace}: {e}");
                    error!(
                        "METRICS | {}",
                        serde_json::to_string(&request.metric_data).unwrap_or_default()
                    );
                }
            }
        }
        report
    }
}

/// Groups in order of first appearance, keeping the original order inside a group.
fn group_by_namespace(metrics: &[MetricDatum]) -> Vec<(&str, Vec<&MetricDatum>)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&MetricDatum>)> = Vec::new();
    for datum in metrics {
        let namespace = datum.namespace.as_str();
        match positions.get(namespace) {
            Some(&position) => groups[position].1.push(datum),
            None => {
                positions.insert(namespace, groups.len());
                groups.push((namespace, vec![datum]));
            }
        }
    }
    groups
}

/// Sends metrics to the regional monitoring endpoint over the JSON 1.0 protocol.
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: reqwest::Client,
    signer: RequestSigner,
    scope: SigningScope,
    host: String,
    url: String,
}

impl CloudWatchSink {
    pub fn new(config: &ForwarderConfig, client: reqwest::Client, signer: RequestSigner) -> Self {
        Self {
            client,
            signer,
            scope: SigningScope::new(config.metrics_region.clone(), METRICS_SERVICE),
            host: config.metrics_host(),
            url: config.metrics_url(),
        }
    }
}

#[async_trait]
impl MetricsSink for CloudWatchSink {
    async fn put_metric_data(
        &self,
        request: &PutMetricDataRequest,
    ) -> Result<(), MetricsPublishError> {
        let body = serde_json::to_string(request)
            .map_err(|e| MetricsPublishError::Payload(e.to_string()))?;
        let unsigned = UnsignedRequest::post(&self.host, "/", body)
            .with_header("Content-Type", AWS_JSON_CONTENT_TYPE)
            .with_header("X-Amz-Target", PUT_METRIC_DATA_TARGET);
        let signed = self.signer.sign(unsigned, &self.scope).await?;
        let headers = signed.header_map()?;

        let resp = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(signed.body)
            .send()
            .await
            .map_err(|e| MetricsPublishError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!(
                "METRICS | Published {} metrics to {}",
                request.metric_data.len(),
                request.namespace
            );
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(MetricsPublishError::Destination(Some(status), text))
    }
}
