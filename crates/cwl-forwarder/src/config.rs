// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{DEFAULT_INDEX_PREFIX, DEFAULT_PRICE_PER_GB_SECOND};
use crate::error::ForwarderError;
use std::env;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the forwarder, passed to every component at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderConfig {
    /// Host of the search domain, e.g. `search-logs-abc.us-east-1.es.amazonaws.com`
    pub search_endpoint: String,
    /// Full base URL to send bulk requests to instead of `https://<search_endpoint>`
    pub search_url_override: Option<String>,
    /// Prefix of the day-bucketed index names
    pub index_prefix: String,
    /// Whether derived metrics are published
    pub metrics_enabled: bool,
    pub metrics_region: String,
    /// Full URL to send metrics requests to instead of the regional endpoint
    pub metrics_url_override: Option<String>,
    /// Compute price used for the `CostInDollars` usage metric
    pub price_per_gb_second: f64,
    /// Log failed bulk items and request errors in full
    pub log_failed_responses: bool,
    /// Per-request timeout in seconds
    pub flush_timeout_secs: u64,
    /// Bulk send attempts when no response is received
    pub bulk_max_attempts: u32,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            search_endpoint: String::new(),
            search_url_override: None,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            metrics_enabled: true,
            metrics_region: "us-east-1".to_string(),
            metrics_url_override: None,
            price_per_gb_second: DEFAULT_PRICE_PER_GB_SECOND,
            log_failed_responses: false,
            flush_timeout_secs: 30,
            bulk_max_attempts: 3,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ForwarderError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ForwarderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let search_endpoint = lookup("CWL_SEARCH_ENDPOINT")
            .map(|val| val.trim().to_string())
            .ok_or_else(|| {
                ForwarderError::InvalidConfig("CWL_SEARCH_ENDPOINT is required".to_string())
            })?;
        let search_url_override = lookup("CWL_SEARCH_URL").filter(|val| !val.is_empty());
        let index_prefix = lookup("CWL_INDEX_PREFIX").unwrap_or(defaults.index_prefix);
        let metrics_enabled = lookup("CWL_METRICS_ENABLED")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.metrics_enabled);
        let metrics_region = lookup("CWL_METRICS_REGION")
            .or_else(|| lookup("AWS_REGION"))
            .filter(|val| !val.is_empty())
            .unwrap_or(defaults.metrics_region);
        let metrics_url_override = lookup("CWL_METRICS_URL").filter(|val| !val.is_empty());
        let price_per_gb_second = match lookup("CWL_PRICE_PER_GB_SECOND") {
            Some(val) => val.trim().parse::<f64>().map_err(|_| {
                ForwarderError::InvalidConfig(format!(
                    "CWL_PRICE_PER_GB_SECOND '{val}' is not a number"
                ))
            })?,
            None => defaults.price_per_gb_second,
        };
        let log_failed_responses = lookup("CWL_LOG_FAILED_RESPONSES")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(defaults.log_failed_responses);
        let flush_timeout_secs = lookup("CWL_FLUSH_TIMEOUT")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.flush_timeout_secs);
        let bulk_max_attempts = lookup("CWL_BULK_MAX_ATTEMPTS")
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.bulk_max_attempts);
        let https_proxy = lookup("CWL_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));
        let log_level = lookup("CWL_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            search_endpoint,
            search_url_override,
            index_prefix,
            metrics_enabled,
            metrics_region,
            metrics_url_override,
            price_per_gb_second,
            log_failed_responses,
            flush_timeout_secs,
            bulk_max_attempts,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.search_endpoint.trim().is_empty() {
            return Err(ForwarderError::InvalidConfig(
                "CWL_SEARCH_ENDPOINT cannot be empty".to_string(),
            ));
        }

        if self.index_prefix.trim().is_empty() {
            return Err(ForwarderError::InvalidConfig(
                "CWL_INDEX_PREFIX cannot be empty".to_string(),
            ));
        }

        if !self.price_per_gb_second.is_finite() || self.price_per_gb_second <= 0.0 {
            return Err(ForwarderError::InvalidConfig(format!(
                "CWL_PRICE_PER_GB_SECOND must be a positive number, got {}",
                self.price_per_gb_second
            )));
        }

        if self.bulk_max_attempts == 0 {
            return Err(ForwarderError::InvalidConfig(
                "CWL_BULK_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ForwarderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Base URL of the bulk endpoint
    #[must_use]
    pub fn search_base_url(&self) -> String {
        match &self.search_url_override {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.search_endpoint),
        }
    }

    /// URL of the metrics endpoint
    #[must_use]
    pub fn metrics_url(&self) -> String {
        match &self.metrics_url_override {
            Some(url) => url.clone(),
            None => format!("https://{}/", self.metrics_host()),
        }
    }

    #[must_use]
    pub fn metrics_host(&self) -> String {
        format!("monitoring.{}.amazonaws.com", self.metrics_region)
    }
}
