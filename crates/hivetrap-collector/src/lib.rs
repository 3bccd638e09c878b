// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side telemetry pipeline for a honeypot instance.
//!
//! Monitored services enqueue observations; a background scheduler batches
//! them on size/time triggers, the envelope codec signs and encrypts each
//! batch, and one of two transports ships it to the remote collector:
//! fire-and-forget UDP datagrams or a TLS broadcast to every live
//! collector connection.
//!
//! ```no_run
//! use hivetrap_collector::config::CollectorConfig;
//! use hivetrap_collector::service::CollectorService;
//!
//! # async fn run(config: CollectorConfig) {
//! let handle = CollectorService::new(config).start().expect("invalid collector config");
//! handle.enqueue("ssh", serde_json::json!({"login": "root"}));
//! // ...
//! handle.drain_and_stop().await;
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

/// Symmetric payload encryption behind the codec's cipher seam.
pub mod cipher;

/// Collector configuration and profile loading.
pub mod config;

/// Wire envelope construction (MAC + encryption + framing).
pub mod envelope;

/// Error types.
pub mod errors;

/// Thread-safe accumulator of pending observations.
pub mod queue;

/// Size/time-triggered background flush loop.
pub mod scheduler;

/// Lifecycle controller: startup, producer handle, graceful shutdown.
pub mod service;

/// TLS multi-peer broadcast transport.
pub mod stream;

/// Transport selection.
pub mod transport;

/// Fire-and-forget UDP transport.
pub mod udp;
