//! Session configuration.

use std::time::Duration;

use mirrordom_sync::{BroadcasterConfig, ViewerConfig};

/// Configuration for both ends of a mirroring session.
#[derive(Debug, Clone, Default)]
pub struct MirrorConfig {
    pub broadcaster: BroadcasterConfig,
    pub viewer: ViewerConfig,
}

impl MirrorConfig {
    /// Set the same poll interval on both ends.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.broadcaster.poll_interval = interval;
        self.viewer.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MirrorConfig::default();
        assert_eq!(config.broadcaster.poll_interval, Duration::from_millis(500));
        assert!(config.broadcaster.send_new_instance_on_start);
        assert_eq!(config.viewer.blank_url, "about:blank");
        assert_eq!(config.viewer.event_capacity, 64);

        let fast = config.with_poll_interval(Duration::from_millis(10));
        assert_eq!(fast.viewer.poll_interval, Duration::from_millis(10));
    }
}
