//! Channel Configuration

use std::time::Duration;

use can_protocol::{BitRate, ChannelId};
use serde::{Deserialize, Serialize};

/// Settings for one managed channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel number on the adapter board.
    pub channel: ChannelId,
    /// Bus bit-rate.
    pub bit_rate: BitRate,
    /// Period of the poll cycle.
    pub poll_interval: Duration,
    /// Upper bound for one wait-for-event call; keeps a tick from blocking.
    pub wait_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            bit_rate: BitRate::Kbit125,
            poll_interval: Duration::from_millis(15),
            wait_timeout: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.channel, 0);
        assert_eq!(config.bit_rate, BitRate::Kbit125);
        assert_eq!(config.poll_interval, Duration::from_millis(15));
        assert!(config.wait_timeout < config.poll_interval);
    }
}
