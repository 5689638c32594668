//! Tunables for participant channels.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by every participant channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames that may wait for the writer before new ones are dropped.
    ///
    /// Default: 64.
    pub outbound_capacity: usize,

    /// How long a single frame write may take. A slower write closes the
    /// connection.
    ///
    /// Default: 5 seconds.
    pub write_timeout: Duration,

    /// How long a close may spend flushing queued frames and sending the
    /// close frame.
    ///
    /// Default: 1 second.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            write_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.outbound_capacity, 64);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.close_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"outbound_capacity": 8}"#).unwrap();
        assert_eq!(config.outbound_capacity, 8);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }
}
