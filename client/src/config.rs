//! Client settings.
//!
//! Everything here has a sensible default for a stock BattlEye server; the
//! only value most callers change is the server address. Settings can also be
//! loaded from a JSON file where durations are given in milliseconds:
//!
//! ```json
//! {
//!   "server_addr": "127.0.0.1:2302",
//!   "auto_reconnect": true,
//!   "keep_alive_interval_ms": 30000,
//!   "timeout_ms": 5000
//! }
//! ```

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 2302;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// RCon endpoint of the game server
    pub server_addr: SocketAddr,
    /// Log back in with the stored password after the connection is lost
    pub auto_reconnect: bool,
    /// Send an empty command when nothing was sent for this long
    #[serde(rename = "keep_alive_interval_ms", with = "millis")]
    pub keep_alive_interval: Duration,
    /// How long a request may go unanswered before the connection counts as lost
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Pause between losing the connection and the reconnect attempt
    #[serde(rename = "reconnect_delay_ms", with = "millis")]
    pub reconnect_delay: Duration,
    /// Upper bound on waiting for the login reply
    #[serde(rename = "login_timeout_ms", with = "millis")]
    pub login_timeout: Duration,
    /// Liveness monitor tick
    #[serde(rename = "monitor_tick_ms", with = "millis")]
    pub monitor_tick: Duration,
    /// Commands allowed to wait behind the one in flight
    pub queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            auto_reconnect: false,
            keep_alive_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            login_timeout: Duration::from_secs(5),
            monitor_tick: Duration::from_secs(1),
            queue_capacity: 64,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make the client time itself out or stall.
    pub fn validate(&self) -> Result<()> {
        if self.keep_alive_interval <= self.timeout {
            return Err(ClientError::Config(format!(
                "keep-alive interval ({:?}) must be longer than the timeout ({:?})",
                self.keep_alive_interval, self.timeout
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must not be zero".into()));
        }
        if self.monitor_tick.is_zero() {
            return Err(ClientError::Config("monitor tick must not be zero".into()));
        }
        if self.login_timeout.is_zero() {
            return Err(ClientError::Config("login timeout must not be zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ClientError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_addr.port(), DEFAULT_PORT);
        assert!(!config.auto_reconnect);
    }

    #[test]
    fn test_keep_alive_must_exceed_timeout() {
        let config = ClientConfig {
            keep_alive_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let config = ClientConfig {
            queue_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let config = ClientConfig::from_json(
            r#"{ "server_addr": "10.0.0.5:2310", "auto_reconnect": true, "timeout_ms": 2500 }"#,
        )
        .unwrap();

        assert_eq!(config.server_addr, "10.0.0.5:2310".parse().unwrap());
        assert!(config.auto_reconnect);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_from_json_invalid_values() {
        let result = ClientConfig::from_json(r#"{ "keep_alive_interval_ms": 1000 }"#);
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_from_json_syntax_error() {
        let result = ClientConfig::from_json("{ not json");
        assert!(matches!(result, Err(ClientError::ConfigFile(_))));
    }

    #[test]
    fn test_json_roundtrip_uses_millis() {
        let config = ClientConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeout_ms"], 5000);
        assert_eq!(json["keep_alive_interval_ms"], 30000);

        let back: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
