//! # Configuration Management
//!
//! Centralized configuration for the speaker protocol stack.
//!
//! This module provides structured configuration for the client connection,
//! the cipher material, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - AES key/IV are caller-supplied configuration and are never embedded in
//!   the codec; per-device factory keys belong in the user's config file.
//! - Key length selects the cipher: 16/24/32 bytes → AES-128/192/256.

use crate::core::cipher::CipherContext;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Conventional control port used by the speakers.
pub const DEFAULT_PORT: u16 = 9741;

/// Maximum bytes accepted from the socket in one delivery.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum size of a single decoded frame (prevents unbounded accumulation
/// when a malformed ciphertext never reaches a block boundary).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default number of writes that may be queued before the transport reports
/// backpressure.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 32;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SpeakerConfig {
    /// Client connection configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport/cipher configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SpeakerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SPEAKER_PROTOCOL_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(timeout) = std::env::var("SPEAKER_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(idle) = std::env::var("SPEAKER_PROTOCOL_IDLE_TIMEOUT_MS") {
            if let Ok(val) = idle.parse::<u64>() {
                config.client.idle_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(key) = std::env::var("SPEAKER_PROTOCOL_KEY") {
            config.transport.key = Some(key);
        }

        if let Ok(iv) = std::env::var("SPEAKER_PROTOCOL_IV") {
            config.transport.iv = Some(iv);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Target speaker address (e.g., "192.168.1.40:9741")
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Idle timeout for an established connection; zero disables the
    /// deadline entirely.
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Maximum number of writes queued before backpressure is reported
    pub write_queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_PORT}"),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Duration::ZERO,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}

impl ClientConfig {
    /// Idle deadline as the transport expects it: `None` disables.
    pub fn deadline(&self) -> Option<Duration> {
        if self.idle_timeout.is_zero() {
            None
        } else {
            Some(self.idle_timeout)
        }
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if !self.address.contains(':') {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: 'host:port')",
                self.address
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if !self.idle_timeout.is_zero() && self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms, or 0 to disable)".to_string());
        }

        if self.write_queue_depth == 0 {
            errors.push("Write queue depth must be greater than 0".to_string());
        } else if self.write_queue_depth > 65536 {
            errors.push(format!(
                "Write queue depth too large: {} (max recommended: 65536)",
                self.write_queue_depth
            ));
        }

        errors
    }
}

/// Transport/cipher configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TransportConfig {
    /// AES key as a raw string; 16/24/32 bytes selects AES-128/192/256.
    /// When absent, the connection is plaintext-only.
    pub key: Option<String>,

    /// AES initialization vector as a raw 16-byte string
    pub iv: Option<String>,
}

impl TransportConfig {
    /// Build the cipher context, or `None` for a plaintext-only connection.
    pub fn cipher(&self) -> Result<Option<CipherContext>> {
        match (&self.key, &self.iv) {
            (Some(key), Some(iv)) => Ok(Some(CipherContext::new(key.as_bytes(), iv.as_bytes())?)),
            (None, None) => Ok(None),
            _ => Err(ProtocolError::Config(
                "key and iv must be configured together".to_string(),
            )),
        }
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match (&self.key, &self.iv) {
            (Some(key), Some(iv)) => {
                if !matches!(key.len(), 16 | 24 | 32) {
                    errors.push(format!(
                        "Invalid AES key length: {} bytes (expected 16, 24 or 32)",
                        key.len()
                    ));
                }
                if iv.len() != 16 {
                    errors.push(format!(
                        "Invalid IV length: {} bytes (expected 16)",
                        iv.len()
                    ));
                }
            }
            (Some(_), None) => {
                errors.push("AES key configured without an IV".to_string());
            }
            (None, Some(_)) => {
                errors.push("IV configured without an AES key".to_string());
            }
            (None, None) => {}
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
