//! Listener configuration, derived from the shared client configuration.

use kinetic_client::KineticConfig;

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Capacity of the delivery pipeline between the bridge and the consumer
    pub queue_depth: usize,

    /// Maximum number of message handlers running at once
    pub throttle_permits: usize,

    /// Longest inbound protocol line accepted, in bytes
    pub max_line_length: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::from(&KineticConfig::default())
    }
}

impl From<&KineticConfig> for ListenerConfig {
    fn from(config: &KineticConfig) -> Self {
        Self {
            queue_depth: config.queue_depth.max(1),
            throttle_permits: config.throttle_permits.max(1),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kinetic_config() {
        let kinetic = KineticConfig {
            queue_depth: 64,
            throttle_permits: 3,
            ..Default::default()
        };
        let config = ListenerConfig::from(&kinetic);
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.throttle_permits, 3);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[test]
    fn test_defaults() {
        let config = ListenerConfig::default();
        assert_eq!(config.queue_depth, 10_000);
        assert_eq!(config.throttle_permits, 5);
    }
}
