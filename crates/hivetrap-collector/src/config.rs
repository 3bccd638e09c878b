// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Transport the collector client speaks to the remote collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Connectionless fire-and-forget datagrams.
    #[serde(rename = "udp")]
    Udp,
    /// Connection-oriented broadcast over TLS-wrapped TCP.
    #[serde(rename = "tcp-ssl")]
    TcpSsl,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::TcpSsl => write!(f, "tcp-ssl"),
        }
    }
}

/// Configuration for one collector client instance.
///
/// The three key fields are symmetric secrets shared with the collector.
/// They are used only locally (MAC computation and payload encryption) and
/// are never transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Opaque identifier the collector uses to tell instances apart.
    pub instance_key: String,
    /// Secret for the HMAC-SHA256 over each batch.
    pub mac_key: String,
    /// Secret for the envelope payload cipher.
    pub encryption_key: String,
    /// Remote collector host.
    pub host: String,
    /// Remote collector port.
    pub port: u16,
    /// Which transport to instantiate.
    pub protocol: Protocol,
}

impl CollectorConfig {
    /// Load the collector config from an instance profile file: a JSON
    /// document whose `collector` object holds the fields above.
    pub fn from_profile_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let profile: serde_json::Value = serde_json::from_str(&raw)?;
        let section = profile
            .get("collector")
            .ok_or(ConfigError::MissingCollectorSection)?;
        Self::from_profile_value(section.clone())
    }

    /// Build the config from an already-extracted `collector` JSON object.
    pub fn from_profile_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: CollectorConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Every key must be present and non-empty
    /// before any send attempt; a miss here is a configuration error, not a
    /// runtime error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_key.trim().is_empty() {
            return Err(ConfigError::MissingField("instance_key"));
        }
        if self.mac_key.trim().is_empty() {
            return Err(ConfigError::MissingField("mac_key"));
        }
        if self.encryption_key.trim().is_empty() {
            return Err(ConfigError::MissingField("encryption_key"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> CollectorConfig {
        CollectorConfig {
            instance_key: "instance-1".to_string(),
            mac_key: "mac-secret".to_string(),
            encryption_key: "enc-secret".to_string(),
            host: "collector.example.org".to_string(),
            port: 2244,
            protocol: Protocol::Udp,
        }
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_keys_are_rejected() {
        for field in ["instance_key", "mac_key", "encryption_key", "host"] {
            let mut config = valid_config();
            match field {
                "instance_key" => config.instance_key = "  ".to_string(),
                "mac_key" => config.mac_key = String::new(),
                "encryption_key" => config.encryption_key = String::new(),
                "host" => config.host = String::new(),
                _ => unreachable!(),
            }
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(field),
                "expected error for `{field}`, got: {err}"
            );
        }
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut config = valid_config();
        config.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPort)
        ));
    }

    #[test]
    fn test_protocol_wire_names() {
        let config = CollectorConfig::from_profile_value(serde_json::json!({
            "instance_key": "i",
            "mac_key": "m",
            "encryption_key": "e",
            "host": "127.0.0.1",
            "port": 9000,
            "protocol": "tcp-ssl",
        }))
        .unwrap();
        assert_eq!(config.protocol, Protocol::TcpSsl);
        assert_eq!(config.protocol.to_string(), "tcp-ssl");
    }

    #[test]
    fn test_unknown_protocol_is_a_parse_error() {
        let result = CollectorConfig::from_profile_value(serde_json::json!({
            "instance_key": "i",
            "mac_key": "m",
            "encryption_key": "e",
            "host": "127.0.0.1",
            "port": 9000,
            "protocol": "carrier-pigeon",
        }));
        assert!(matches!(result, Err(ConfigError::ProfileParse(_))));
    }

    #[test]
    fn test_from_profile_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "deployment": "lab",
                "collector": {{
                    "instance_key": "i",
                    "mac_key": "m",
                    "encryption_key": "e",
                    "host": "127.0.0.1",
                    "port": 9000,
                    "protocol": "udp"
                }}
            }}"#
        )
        .unwrap();

        let config = CollectorConfig::from_profile_file(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.protocol, Protocol::Udp);
    }

    #[test]
    fn test_profile_without_collector_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"deployment": "lab"}}"#).unwrap();

        let result = CollectorConfig::from_profile_file(file.path());
        assert!(matches!(result, Err(ConfigError::MissingCollectorSection)));
    }
}
