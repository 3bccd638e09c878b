// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while loading or validating the collector configuration.
/// All of these are fatal at startup; the scheduler is never started with a
/// config that failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("collector config field `{0}` must be present and non-empty")]
    MissingField(&'static str),

    #[error("collector config port must be non-zero")]
    InvalidPort,

    #[error("could not read collector profile at {path}: {source}")]
    ProfileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse collector profile: {0}")]
    ProfileParse(#[from] serde_json::Error),

    #[error("collector profile has no `collector` section")]
    MissingCollectorSection,

    #[error("failed to initialize TLS client: {0}")]
    Tls(String),
}

/// Per-batch encoding failures. These are isolated to the batch being
/// encoded: the scheduler logs them and keeps running.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to encrypt envelope payload: {0}")]
    Cipher(#[from] crate::cipher::CipherError),
}
