use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every timeout the engine enforces, in one place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutPolicy {
    /// Force-clears a configuration-change block whose persist/change-record
    /// steps never finished
    pub config_change_timeout: Duration,
    /// A synthesis streaming longer than this counts as complete for navigation
    pub synthesis_streaming_override: Duration,
    /// A pending placeholder synthesis older than this stops blocking navigation
    /// while nothing is streaming
    pub placeholder_override: Duration,
    /// A ready synthesis that never starts streaming stops blocking navigation
    /// after this long; `None` waits forever
    pub ready_synthesis_override: Option<Duration>,
    /// How long to wait on a stream reported active elsewhere before restarting it
    pub active_stream_wait: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            config_change_timeout: Duration::from_secs(30),
            synthesis_streaming_override: Duration::from_secs(60),
            placeholder_override: Duration::from_secs(15),
            ready_synthesis_override: Some(Duration::from_secs(60)),
            active_stream_wait: Duration::from_secs(60),
        }
    }
}

impl TimeoutPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_change_timeout(mut self, timeout: Duration) -> Self {
        self.config_change_timeout = timeout;
        self
    }

    pub fn with_synthesis_streaming_override(mut self, timeout: Duration) -> Self {
        self.synthesis_streaming_override = timeout;
        self
    }

    pub fn with_placeholder_override(mut self, timeout: Duration) -> Self {
        self.placeholder_override = timeout;
        self
    }

    pub fn with_ready_synthesis_override(mut self, timeout: Option<Duration>) -> Self {
        self.ready_synthesis_override = timeout;
        self
    }

    pub fn with_active_stream_wait(mut self, timeout: Duration) -> Self {
        self.active_stream_wait = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub policy: TimeoutPolicy,
    /// Interval of the clock tick that drives the timeout policy
    pub tick_interval: Duration,
    pub channel_capacity: usize,
    /// Poll interval of the stream status store while waiting on a remote stream
    pub stream_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: TimeoutPolicy::default(),
            tick_interval: Duration::from_secs(1),
            channel_capacity: 1000,
            stream_poll_interval: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_stream_poll_interval(mut self, interval: Duration) -> Self {
        self.stream_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.config_change_timeout, Duration::from_secs(30));
        assert_eq!(policy.synthesis_streaming_override, Duration::from_secs(60));
        assert_eq!(policy.placeholder_override, Duration::from_secs(15));
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new()
            .with_tick_interval(Duration::from_millis(50))
            .with_policy(TimeoutPolicy::new().with_ready_synthesis_override(None));

        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.policy.ready_synthesis_override, None);
        assert_eq!(config.channel_capacity, 1000);
    }
}
