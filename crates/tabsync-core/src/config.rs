//! Configuration for the live-update subsystem.
//!
//! Loaded from TOML. Every field is optional; durations are written as
//! integer milliseconds (`*_ms` keys).
//!
//! ```toml
//! [stream]
//! url = "http://127.0.0.1:3030/events"
//! initial_backoff_ms = 1000
//! max_backoff_ms = 30000
//!
//! [leader]
//! heartbeat_interval_ms = 4000
//! lease_ttl_ms = 10000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{TabSyncError, TabSyncResult};

/// Default SSE endpoint of the dashboard server.
pub const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:3030/events";

/// Well-known key holding the lease record.
pub const DEFAULT_LEASE_KEY: &str = "tabsync:leader";

/// Well-known channel name for cross-tab mirroring.
pub const DEFAULT_CHANNEL_NAME: &str = "tabsync:updates";

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabSyncConfig {
    pub stream: StreamConfig,
    pub leader: LeaderConfig,
    pub relay: RelayConfig,
}

impl TabSyncConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml_str(s: &str) -> TabSyncResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> TabSyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> TabSyncResult<String> {
        toml::to_string_pretty(self).map_err(|e| TabSyncError::invalid_config(e.to_string()))
    }

    pub fn validate(&self) -> TabSyncResult<()> {
        self.stream.validate()?;
        self.leader.validate()?;
        self.relay.validate()
    }
}

/// Stream Controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,

    #[serde(rename = "initial_backoff_ms", with = "duration_ms")]
    pub initial_backoff: Duration,

    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,

    #[serde(rename = "debounce_ms", with = "duration_ms")]
    pub debounce: Duration,

    /// How long to stay disconnected before warning the user. `0` disables.
    #[serde(rename = "disconnect_warning_ms", with = "optional_duration_ms")]
    pub disconnect_warning: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            debounce: Duration::from_millis(200),
            disconnect_warning: Some(Duration::from_secs(10)),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> TabSyncResult<()> {
        if self.url.trim().is_empty() {
            return Err(TabSyncError::invalid_config("stream.url must not be empty"));
        }
        if self.initial_backoff.is_zero() {
            return Err(TabSyncError::invalid_config(
                "stream.initial_backoff_ms must be greater than zero",
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(TabSyncError::invalid_config(format!(
                "stream.max_backoff_ms ({}) must be at least initial_backoff_ms ({})",
                self.max_backoff.as_millis(),
                self.initial_backoff.as_millis()
            )));
        }
        if self.debounce.is_zero() {
            return Err(TabSyncError::invalid_config(
                "stream.debounce_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Leader Coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderConfig {
    pub lease_key: String,

    /// Lease renewal period while leader.
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    pub heartbeat_interval: Duration,

    #[serde(rename = "lease_ttl_ms", with = "duration_ms")]
    pub lease_ttl: Duration,

    /// Periodic re-evaluation. Defaults to twice the heartbeat interval.
    #[serde(
        rename = "safety_check_interval_ms",
        with = "optional_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub safety_check_interval: Option<Duration>,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            lease_key: DEFAULT_LEASE_KEY.to_string(),
            heartbeat_interval: Duration::from_millis(4000),
            lease_ttl: Duration::from_millis(10_000),
            safety_check_interval: None,
        }
    }
}

impl LeaderConfig {
    pub fn safety_check_interval(&self) -> Duration {
        self.safety_check_interval
            .unwrap_or(self.heartbeat_interval * 2)
    }

    /// The lease must outlive one renewal period.
    pub fn validate(&self) -> TabSyncResult<()> {
        if self.lease_key.trim().is_empty() {
            return Err(TabSyncError::invalid_config("leader.lease_key must not be empty"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(TabSyncError::invalid_config(
                "leader.heartbeat_interval_ms must be greater than zero",
            ));
        }
        if self.lease_ttl <= self.heartbeat_interval {
            return Err(TabSyncError::invalid_config(format!(
                "leader.lease_ttl_ms ({}) must be greater than heartbeat_interval_ms ({})",
                self.lease_ttl.as_millis(),
                self.heartbeat_interval.as_millis()
            )));
        }
        if self.safety_check_interval().is_zero() {
            return Err(TabSyncError::invalid_config(
                "leader.safety_check_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Broadcast Relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub channel_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> TabSyncResult<()> {
        if self.channel_name.trim().is_empty() {
            return Err(TabSyncError::invalid_config(
                "relay.channel_name must not be empty",
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// `0` means "disabled".
mod optional_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.map_or(0, |d| d.as_millis() as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok((ms > 0).then(|| Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = TabSyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.leader.safety_check_interval(), Duration::from_millis(8000));
        assert_eq!(config.stream.debounce, Duration::from_millis(200));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TabSyncConfig::from_toml_str(
            "[stream]\nmax_backoff_ms = 8000\n\n[leader]\nheartbeat_interval_ms = 1000\nlease_ttl_ms = 3000\n",
        )
        .unwrap();
        assert_eq!(config.stream.max_backoff, Duration::from_millis(8000));
        assert_eq!(config.stream.initial_backoff, Duration::from_millis(1000));
        assert_eq!(config.leader.safety_check_interval(), Duration::from_millis(2000));
        assert_eq!(config.relay.channel_name, DEFAULT_CHANNEL_NAME);
    }

    #[test]
    fn test_zero_disables_disconnect_warning() {
        let config = TabSyncConfig::from_toml_str("[stream]\ndisconnect_warning_ms = 0\n").unwrap();
        assert_eq!(config.stream.disconnect_warning, None);
    }

    #[test]
    fn test_ttl_must_exceed_heartbeat() {
        let err = TabSyncConfig::from_toml_str(
            "[leader]\nheartbeat_interval_ms = 4000\nlease_ttl_ms = 4000\n",
        )
        .unwrap_err();
        assert!(matches!(err, TabSyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_max_backoff_below_initial_rejected() {
        let err = TabSyncConfig::from_toml_str(
            "[stream]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 1000\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_backoff_ms"));
    }

    #[test]
    fn test_unparseable_toml() {
        let err = TabSyncConfig::from_toml_str("[stream\n").unwrap_err();
        assert!(matches!(err, TabSyncError::Config(_)));
    }

    #[test]
    fn test_load_from_file_and_render() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nchannel_name = \"board-7\"").unwrap();

        let config = TabSyncConfig::load(file.path()).unwrap();
        assert_eq!(config.relay.channel_name, "board-7");

        let rendered = config.to_toml_string().unwrap();
        let reparsed = TabSyncConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }
}
