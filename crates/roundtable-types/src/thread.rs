use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation mode the moderator and participants are prompted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Analyzing,
    Brainstorming,
    Debating,
    Solving,
}

impl Default for ChatMode {
    fn default() -> Self {
        ChatMode::Analyzing
    }
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Analyzing => "analyzing",
            ChatMode::Brainstorming => "brainstorming",
            ChatMode::Debating => "debating",
            ChatMode::Solving => "solving",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: String,
    pub slug: String,
    pub title: Option<String>,
    pub mode: ChatMode,
    pub enable_web_search: bool,
    pub is_ai_generated_title: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: impl Into<String>, slug: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            title: None,
            mode: ChatMode::default(),
            enable_web_search: false,
            is_ai_generated_title: false,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.enable_web_search = enabled;
        self
    }

    /// The title the UI waits for before leaving the overview screen
    pub fn title_ready(&self) -> bool {
        self.is_ai_generated_title && self.title.is_some()
    }
}

/// One configured AI responder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub priority: u32,
    pub is_enabled: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            role: None,
            priority,
            is_enabled: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

/// Enabled participants in streaming order.
///
/// Ties on `priority` keep their configured order so the roster is stable.
pub fn roster(participants: &[Participant]) -> Vec<Participant> {
    let mut enabled: Vec<Participant> = participants
        .iter()
        .filter(|p| p.is_enabled)
        .cloned()
        .collect();
    enabled.sort_by_key(|p| p.priority);
    enabled
}
