// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::path::PathBuf;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hivetrap_collector::config::CollectorConfig;
use hivetrap_collector::service::CollectorService;

const DEFAULT_PROFILE_PATH: &str = "hivetrap_profile.json";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("HIVETRAP_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let profile_path = env::var("HIVETRAP_PROFILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROFILE_PATH));

    let config = match CollectorConfig::from_profile_file(&profile_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading collector config on agent startup: {e}");
            return;
        }
    };

    let handle = match CollectorService::new(config).start() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Error starting collector client: {e}");
            return;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutdown signal received, flushing remaining telemetry");
    handle.drain_and_stop().await;
}
