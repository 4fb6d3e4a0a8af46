//! Configuration types for the state diff service

use crate::error::{Result, StateDiffError};
use serde::Deserialize;

/// Static configuration, read once at construction
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StateDiffConfig {
    /// Stream the encoded block and its receipts alongside every diff
    pub stream_block: bool,

    /// Capacity of the chain event intake channel allocated by `start`
    pub event_channel_capacity: usize,

    /// Payload sink capacity used by `StateDiffService::stream`
    pub payload_channel_capacity: usize,

    /// Control sink capacity used by `StateDiffService::stream`
    pub control_channel_capacity: usize,
}

impl Default for StateDiffConfig {
    fn default() -> Self {
        Self {
            stream_block: false,
            event_channel_capacity: crate::CHAIN_EVENT_CHANNEL_SIZE,
            payload_channel_capacity: crate::PAYLOAD_CHANNEL_SIZE,
            control_channel_capacity: 1,
        }
    }
}

impl StateDiffConfig {
    /// Reject zero-sized channels; tokio panics on them
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("event_channel_capacity", self.event_channel_capacity),
            ("payload_channel_capacity", self.payload_channel_capacity),
            ("control_channel_capacity", self.control_channel_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(StateDiffError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StateDiffConfig::default();
        assert!(!config.stream_block);
        assert_eq!(config.event_channel_capacity, crate::CHAIN_EVENT_CHANNEL_SIZE);
        assert_eq!(config.control_channel_capacity, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StateDiffConfig {
            payload_channel_capacity: 0,
            ..StateDiffConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StateDiffError::InvalidConfig(ref m) if m.contains("payload")));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StateDiffConfig = serde_json::from_str(r#"{"stream_block": true}"#).unwrap();
        assert!(config.stream_block);
        assert_eq!(config.payload_channel_capacity, crate::PAYLOAD_CHANNEL_SIZE);
    }
}
