use std::time::Duration;

use crate::dbs::memory::client::{MemoryBackendConfig, ResearchOutcome};
use crate::MemoryBackend;

/// Builder for a scripted [`MemoryBackend`]
pub struct MemoryBackendBuilder {
    config: MemoryBackendConfig,
}

impl MemoryBackendBuilder {
    pub fn new() -> Self {
        Self {
            config: MemoryBackendConfig::default(),
        }
    }

    /// Time each research execution takes before settling
    pub fn research_delay(mut self, delay: Duration) -> Self {
        self.config.research_delay = delay;
        self
    }

    /// Time before `await_title` resolves
    pub fn title_delay(mut self, delay: Duration) -> Self {
        self.config.title_delay = delay;
        self
    }

    pub fn observe_poll_interval(mut self, interval: Duration) -> Self {
        self.config.observe_poll_interval = interval;
        self
    }

    pub fn observe_timeout(mut self, timeout: Duration) -> Self {
        self.config.observe_timeout = timeout;
        self
    }

    /// Script the research outcome of one round; unscripted rounds succeed
    pub fn research_outcome(mut self, round_number: u32, outcome: ResearchOutcome) -> Self {
        self.config.research_outcomes.insert(round_number, outcome);
        self
    }

    /// Reject every configuration update
    pub fn fail_config_updates(mut self, fail: bool) -> Self {
        self.config.fail_config_updates = fail;
        self
    }

    pub fn build(self) -> MemoryBackend {
        MemoryBackend::with_config(self.config)
    }
}

impl Default for MemoryBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}
