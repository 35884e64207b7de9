use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Why a participant or moderator stream ended.
///
/// `Unknown` is what an empty or interrupted stream leaves behind; a message
/// still streaming has no finish reason at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Unknown,
}

impl FinishReason {
    /// Parse a provider finish reason; anything unrecognised maps to `Unknown`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "error" | "content_filter" => FinishReason::Error,
            _ => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: MessageRole,
    pub round_number: u32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        round_number: u32,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role: MessageRole::User,
            round_number,
            content: content.into(),
            participant_index: None,
            participant_id: None,
            finish_reason: None,
            is_moderator: false,
            created_at,
        }
    }

    /// Empty assistant message for a participant that just started streaming
    pub fn participant(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        round_number: u32,
        participant_index: usize,
        participant_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role: MessageRole::Assistant,
            round_number,
            content: String::new(),
            participant_index: Some(participant_index),
            participant_id: Some(participant_id.into()),
            finish_reason: None,
            is_moderator: false,
            created_at,
        }
    }

    pub fn moderator(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        round_number: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role: MessageRole::Assistant,
            round_number,
            content: String::new(),
            participant_index: None,
            participant_id: None,
            finish_reason: None,
            is_moderator: true,
            created_at,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Assistant message written by a participant (not the moderator)
    pub fn is_participant(&self) -> bool {
        self.role == MessageRole::Assistant && !self.is_moderator
    }

    /// `stop` or `length`
    pub fn is_complete(&self) -> bool {
        matches!(
            self.finish_reason,
            Some(FinishReason::Stop) | Some(FinishReason::Length)
        )
    }

    pub fn is_errored(&self) -> bool {
        self.finish_reason == Some(FinishReason::Error)
    }

    /// Complete or errored; the sequencer never revisits these
    pub fn is_settled(&self) -> bool {
        self.is_complete() || self.is_errored()
    }
}
