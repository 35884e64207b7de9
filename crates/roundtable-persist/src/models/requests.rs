use serde::{Deserialize, Serialize};

use roundtable_types::{ChatMode, Participant, RoundConfig};

/// First submission of a fresh conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateThreadRequest {
    /// Id the caller already assigned to the optimistic user message
    pub message_id: String,
    pub first_message: String,
    pub participants: Vec<Participant>,
    pub mode: ChatMode,
    pub enable_web_search: bool,
}

impl CreateThreadRequest {
    pub fn new(message_id: impl Into<String>, first_message: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            first_message: first_message.into(),
            participants: Vec::new(),
            mode: ChatMode::default(),
            enable_web_search: false,
        }
    }

    pub fn with_config(mut self, config: RoundConfig) -> Self {
        self.participants = config.participants;
        self.mode = config.mode;
        self.enable_web_search = config.enable_web_search;
        self
    }

    pub fn config(&self) -> RoundConfig {
        RoundConfig::new(self.participants.clone(), self.mode, self.enable_web_search)
    }
}

/// Configuration a later round starts with.
///
/// Persisting it produces the change record of `round_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub round_number: u32,
    pub config: RoundConfig,
}

impl ConfigUpdate {
    pub fn new(round_number: u32, config: RoundConfig) -> Self {
        Self {
            round_number,
            config,
        }
    }
}
