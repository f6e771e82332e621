//! Session and server configuration
//!
//! Configuration is passed explicitly to the server and to each session; there
//! is no process-wide state. Durations serialize as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use wsmedia_core::{StreamError, DEFAULT_MAX_FRAGMENT_SIZE};
use wsmedia_media::MediaFiles;

/// Per-connection timing and sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time allowed to write a single message to the peer
    #[serde(with = "duration_ms", rename = "write_wait_ms")]
    pub write_wait: Duration,
    /// Time allowed between pongs before the peer is considered gone
    #[serde(with = "duration_ms", rename = "pong_wait_ms")]
    pub pong_wait: Duration,
    /// Keepalive ping period, must be shorter than `pong_wait`
    #[serde(with = "duration_ms", rename = "ping_period_ms")]
    pub ping_period: Duration,
    /// Largest payload fragment sent in one message
    pub max_fragment_size: usize,
    /// Largest message accepted from the peer
    pub max_inbound_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::with_pong_wait(Duration::from_secs(60))
    }
}

impl SessionConfig {
    /// Defaults with the ping period derived from `pong_wait` (90 %)
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            max_inbound_message_size: 64 * 1024,
        }
    }

    /// Tight deadlines for clients on a local network
    pub fn low_latency() -> Self {
        Self {
            write_wait: Duration::from_secs(2),
            ..Self::with_pong_wait(Duration::from_secs(10))
        }
    }

    /// Generous deadlines for slow or lossy links
    pub fn lenient() -> Self {
        Self {
            write_wait: Duration::from_secs(30),
            ..Self::with_pong_wait(Duration::from_secs(120))
        }
    }

    /// Check the configuration for values the session cannot work with
    pub fn validate(&self) -> Result<(), StreamError> {
        let durations = [
            ("write_wait", self.write_wait),
            ("pong_wait", self.pong_wait),
            ("ping_period", self.ping_period),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.ping_period >= self.pong_wait {
            return Err(invalid("ping_period", "must be shorter than pong_wait"));
        }
        if self.max_fragment_size == 0 {
            return Err(invalid("max_fragment_size", "must be greater than zero"));
        }
        if self.max_inbound_message_size == 0 {
            return Err(invalid("max_inbound_message_size", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Listener and media configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the server binds to
    pub bind_addr: SocketAddr,
    /// Request path that is upgraded to a stream
    pub path: String,
    /// H.264 Annex B file streamed to every client
    pub video_path: PathBuf,
    /// A-law PCM file streamed to every client
    pub audio_path: PathBuf,
    /// Time allowed for the WebSocket upgrade
    #[serde(with = "duration_ms", rename = "handshake_timeout_ms")]
    pub handshake_timeout: Duration,
    /// Per-connection settings
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 8080),
            path: "/ws/test".to_string(),
            video_path: PathBuf::from("test/test.h264"),
            audio_path: PathBuf::from("test/test.alaw"),
            handshake_timeout: Duration::from_secs(10),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Media files named by this configuration
    pub fn media_files(&self) -> MediaFiles {
        MediaFiles::new(&self.video_path, &self.audio_path)
    }

    /// Check the configuration, including the session settings
    pub fn validate(&self) -> Result<(), StreamError> {
        if !self.path.starts_with('/') {
            return Err(invalid("path", "must start with '/'"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(invalid("handshake_timeout", "must be greater than zero"));
        }
        self.session.validate()
    }
}

fn invalid(field: &str, reason: &str) -> StreamError {
    StreamError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.max_fragment_size, 1400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(SessionConfig::low_latency().validate().is_ok());
        assert!(SessionConfig::lenient().validate().is_ok());
        assert_eq!(SessionConfig::low_latency().ping_period, Duration::from_secs(9));
    }

    #[test]
    fn test_validate_rejects_ping_after_pong_wait() {
        let config = SessionConfig {
            ping_period: Duration::from_secs(60),
            ..SessionConfig::default()
        };
        match config.validate() {
            Err(StreamError::InvalidConfiguration { field, .. }) => assert_eq!(field, "ping_period"),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_fragment_size() {
        let config = SessionConfig {
            max_fragment_size: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_config_json() {
        let json = r#"{
            "bind_addr": "127.0.0.1:9000",
            "path": "/live",
            "session": { "pong_wait_ms": 20000, "ping_period_ms": 18000 }
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.path, "/live");
        assert_eq!(config.video_path, PathBuf::from("test/test.h264"));
        assert_eq!(config.session.pong_wait, Duration::from_secs(20));
        assert_eq!(config.session.write_wait, Duration::from_secs(10));
        assert!(config.validate().is_ok());

        let round_trip: ServerConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_server_config_rejects_relative_path() {
        let config = ServerConfig {
            path: "ws".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
