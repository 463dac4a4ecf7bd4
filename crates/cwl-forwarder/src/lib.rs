// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! # cwl-forwarder
//!
//! Ships batches of serverless function logs, as delivered by a log
//! subscription, to a bulk search index and derives two kinds of metrics from
//! them on the way:
//!
//! - custom metrics written by the function as `MONITORING|...` marker lines,
//! - usage and cost metrics read from the platform's `REPORT` summary lines.
//!
//! [`pipeline::Forwarder`] is the entry point. It decodes a batch
//! ([`decoder`]), classifies every line ([`classifier`], [`usage`]), builds the
//! bulk payload ([`bulk`]) and publishes documents ([`bulk_publisher`]) and
//! metrics ([`metrics_publisher`]) concurrently, both over requests signed by
//! [`signer`].
//!
//! Functions that want to report their own metrics can use
//! [`accumulator::MetricsAccumulator`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod accumulator;
pub mod batch;
pub mod bulk;
pub mod bulk_publisher;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod decoder;
pub mod error;
pub mod http;
pub mod logger;
pub mod metric;
pub mod metrics_publisher;
pub mod pipeline;
pub mod signer;
pub mod usage;
