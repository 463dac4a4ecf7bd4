// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared HTTP client construction.
//!
//! One client is built per forwarder and reused by the bulk and metrics
//! publishers. It honors the configured request timeout and HTTPS proxy; a proxy
//! that cannot be parsed is logged and the client falls back to a direct
//! connection.

use crate::config::ForwarderConfig;
use core::time::Duration;
use std::error::Error;
use tracing::error;

#[must_use]
pub fn get_client(config: &ForwarderConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "FORWARDER | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "FORWARDER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &ForwarderConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.flush_timeout_secs))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}
