//! Annunciator Configuration
//!
//! Loaded from a TOML file. Every field has a default, so a partial file (or
//! an empty one) is valid. Durations are stored as integer milliseconds or
//! seconds and exposed as [`Duration`] through accessors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use annunciator_effects::{BridgeConfig, IntercomConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text shown while the upstream link is down.
pub const LINK_DOWN_MESSAGE: &str = "Drum cut cycle stages unknown. Link to DCS server down.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnunciatorConfig {
    /// Display client listener
    pub server: ServerConfig,
    /// Upstream process-data source
    pub upstream: UpstreamConfig,
    /// Sign bridge, lease and recovery
    pub sign: SignConfig,
    /// Speech host and panel relay
    pub intercom: IntercomSettings,
    /// Custom message reversion
    pub revert: RevertConfig,
    pub settings: Settings,
}

impl AnnunciatorConfig {
    /// Load from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pause between failed bind attempts
    pub bind_retry_secs: u64,
    /// Pause once `bind_backoff_after` attempts have failed
    pub bind_backoff_secs: u64,
    pub bind_backoff_after: u32,
    /// Bound on reading a request from a connected client
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bind_retry(&self) -> Duration {
        Duration::from_secs(self.bind_retry_secs)
    }

    pub fn bind_backoff(&self) -> Duration {
        Duration::from_secs(self.bind_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            bind_retry_secs: 60,
            bind_backoff_secs: 900,
            bind_backoff_after: 5,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    /// Connect, request and response timeout
    pub io_timeout_ms: u64,
    /// Timeout for sending the ACK/NAK once the response has been applied
    pub ack_timeout_ms: u64,
    /// Consecutive connection failures before the link-down display
    pub link_down_threshold: u32,
    pub link_down_message: String,
    /// Re-check interval while a power cycle is running
    pub power_cycle_check_ms: u64,
    /// Extra pause after an invalid response
    pub invalid_backoff_ms: u64,
}

impl UpstreamConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn power_cycle_check(&self) -> Duration {
        Duration::from_millis(self.power_cycle_check_ms)
    }

    pub fn invalid_backoff(&self) -> Duration {
        Duration::from_millis(self.invalid_backoff_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            poll_interval_ms: 3_000,
            io_timeout_ms: 5_000,
            ack_timeout_ms: 80_000,
            link_down_threshold: 20,
            link_down_message: LINK_DOWN_MESSAGE.to_string(),
            power_cycle_check_ms: 5_000,
            invalid_backoff_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    /// `host:port` of the serial bridge
    pub bridge_addr: String,
    pub io_timeout_ms: u64,
    /// Tries per command before the sign counts as unresponsive
    pub send_attempts: u32,
    pub retry_pause_ms: u64,
    pub lease_attempts: u32,
    pub lease_poll_ms: u64,
    /// Boot time after a power cycle
    pub warmup_secs: u64,
    /// Pause before retrying a failed power cycle
    pub recovery_retry_ms: u64,
    /// Pause between attempts to take the sign off an alert
    pub alarm_off_retry_ms: u64,
}

impl SignConfig {
    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            addr: self.bridge_addr.clone(),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            send_attempts: self.send_attempts,
            retry_pause: Duration::from_millis(self.retry_pause_ms),
        }
    }

    pub fn lease_poll(&self) -> Duration {
        Duration::from_millis(self.lease_poll_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn recovery_retry(&self) -> Duration {
        Duration::from_millis(self.recovery_retry_ms)
    }

    pub fn alarm_off_retry(&self) -> Duration {
        Duration::from_millis(self.alarm_off_retry_ms)
    }
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            bridge_addr: "127.0.0.1:9100".to_string(),
            io_timeout_ms: 5_000,
            send_attempts: 4,
            retry_pause_ms: 2_000,
            lease_attempts: 5,
            lease_poll_ms: 4_000,
            warmup_secs: 60,
            recovery_retry_ms: 5_000,
            alarm_off_retry_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntercomSettings {
    /// `host:port` of the text-to-speech host
    pub speech_addr: String,
    pub io_timeout_ms: u64,
    pub power_cycle_hold_ms: u64,
}

impl IntercomSettings {
    pub fn handler(&self) -> IntercomConfig {
        IntercomConfig {
            speech_addr: self.speech_addr.clone(),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            power_cycle_hold: Duration::from_millis(self.power_cycle_hold_ms),
            ..IntercomConfig::default()
        }
    }
}

impl Default for IntercomSettings {
    fn default() -> Self {
        Self {
            speech_addr: "127.0.0.1:9200".to_string(),
            io_timeout_ms: 5_000,
            power_cycle_hold_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevertConfig {
    /// Cancellation check interval while a revert is pending
    pub check_interval_ms: u64,
}

impl RevertConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Debug-level logging
    pub debug: bool,
}
