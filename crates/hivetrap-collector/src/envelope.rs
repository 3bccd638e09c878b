// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire envelope construction.
//!
//! Each batch is turned into a JSON object with exactly two top-level
//! fields:
//!
//! ```text
//! { "instance": <instance key>,
//!   "data": base64( encrypt( encryption key,
//!             { "hmac": <hex HMAC-SHA256 over canonical batch JSON>,
//!               "content": <batch> } ) ) }
//! ```
//!
//! The HMAC is computed over a canonical serialization of the batch:
//! entries are lowered to `serde_json::Value` first, whose object maps are
//! BTreeMap-backed, so keys always serialize in sorted order and the MAC is
//! reproducible regardless of how any map was built.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use crate::cipher::{PayloadCipher, XChaChaPayloadCipher};
use crate::config::CollectorConfig;
use crate::errors::{ConfigError, EncodeError};
use crate::queue::QueueEntry;

type HmacSha256 = Hmac<Sha256>;

/// Turns a drained batch into a signed, encrypted, framed message.
///
/// Pure aside from nonce generation; never mutates the batch and holds no
/// network or lock state. Key validation happens at construction, not per
/// message.
#[derive(Clone)]
pub struct EnvelopeCodec {
    instance_key: String,
    mac_key: String,
    encryption_key: String,
    cipher: Arc<dyn PayloadCipher>,
}

impl EnvelopeCodec {
    /// Build a codec from validated config with the default cipher.
    pub fn new(config: &CollectorConfig) -> Result<Self, ConfigError> {
        Self::with_cipher(config, Arc::new(XChaChaPayloadCipher))
    }

    /// Build a codec with an alternate encryption primitive.
    pub fn with_cipher(
        config: &CollectorConfig,
        cipher: Arc<dyn PayloadCipher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(EnvelopeCodec {
            instance_key: config.instance_key.clone(),
            mac_key: config.mac_key.clone(),
            encryption_key: config.encryption_key.clone(),
            cipher,
        })
    }

    /// Encode one batch into envelope bytes ready for transmission.
    pub fn encode(&self, batch: &[QueueEntry]) -> Result<Vec<u8>, EncodeError> {
        let content = serde_json::to_value(batch)?;
        let mac = self.batch_mac(&content)?;

        let payload = serde_json::json!({
            "hmac": mac,
            "content": content,
        });
        let ciphertext = self
            .cipher
            .encrypt(&self.encryption_key, serde_json::to_string(&payload)?.as_bytes())?;

        let envelope = serde_json::json!({
            "instance": self.instance_key,
            "data": BASE64.encode(ciphertext),
        });
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Lowercase hex HMAC-SHA256 over the canonical batch serialization.
    fn batch_mac(&self, content: &serde_json::Value) -> Result<String, EncodeError> {
        let canonical = serde_json::to_string(content)?;
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(self.mac_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys stay out of debug output.
        f.debug_struct("EnvelopeCodec")
            .field("instance_key", &self.instance_key)
            .finish_non_exhaustive()
    }
}
