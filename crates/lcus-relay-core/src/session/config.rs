//! Session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// How a switch command is confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Read the board status after switching and compare (LCUS_X2 sends no reply)
    #[default]
    Readback,
    /// The board echoes each switch frame
    Echo,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-exchange read timeout in milliseconds
    pub timeout_ms: u64,
    /// Relay count; `None` asks the board
    pub channels: Option<u8>,
    /// Switch every relay off when the session opens
    pub init_off: bool,
    /// Status queries per `status()` call, the last reply wins
    pub status_reads: u8,
    /// Acknowledgement strategy for switch commands
    pub ack: AckMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            channels: None,
            init_off: true,
            status_reads: 2,
            ack: AckMode::Readback,
        }
    }
}

impl SessionConfig {
    /// Default configuration for `port_name`
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// `timeout_ms` as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lcus_settings() {
        let config = SessionConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout(), Duration::from_millis(50));
        assert_eq!(config.channels, None);
        assert!(config.init_off);
        assert_eq!(config.ack, AckMode::Readback);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"port_name": "COM3", "channels": 4, "ack": "echo"}"#)
                .unwrap();
        assert_eq!(config.port_name, "COM3");
        assert_eq!(config.channels, Some(4));
        assert_eq!(config.ack, AckMode::Echo);
        assert_eq!(config.status_reads, 2);
    }
}
