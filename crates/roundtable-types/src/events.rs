use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::FinishReason;
use crate::records::{ChangeRecord, ResearchResult};
use crate::snapshot::{StreamStatusEntry, ThreadSnapshot};
use crate::thread::{ChatMode, Participant, Thread};

/// Commands a UI issues against the engine.
///
/// The runtime turns each command into a timestamped [`RoundEvent`] carrying
/// freshly generated ids, so the reducer itself never reads a clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SubmitMessage { content: String },
    ToggleWebSearch { enabled: bool },
    UpdateParticipants { participants: Vec<Participant> },
    SetMode { mode: ChatMode },
    RetryRound { round_number: u32 },
    SetOnline { online: bool },
    Attach { thread_id: String },
}

/// Every input the reducer reacts to.
///
/// User intent, collaborator results and clock ticks all arrive through this
/// one type; what each of them triggers is decided by the reducer alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    MessageSubmitted {
        message_id: String,
        research_id: String,
        synthesis_id: String,
        content: String,
        at: DateTime<Utc>,
    },

    /// Staged until the next submission
    WebSearchToggled {
        enabled: bool,
    },

    /// Staged until the next submission
    ParticipantsUpdated {
        participants: Vec<Participant>,
    },

    /// Staged until the next submission
    ModeChanged {
        mode: ChatMode,
    },

    RoundRetryRequested {
        round_number: u32,
        research_id: String,
        synthesis_id: String,
        at: DateTime<Utc>,
    },

    /// Persisted responses of a regenerated round were dropped
    RoundDiscarded {
        round_number: u32,
        at: DateTime<Utc>,
    },

    RoundDiscardFailed {
        round_number: u32,
        error: String,
        at: DateTime<Utc>,
    },

    ConnectivityChanged {
        online: bool,
        at: DateTime<Utc>,
    },

    ThreadCreated {
        thread: Thread,
        participants: Vec<Participant>,
        at: DateTime<Utc>,
    },

    ThreadCreationFailed {
        error: String,
        at: DateTime<Utc>,
    },

    TitleReady {
        title: String,
        at: DateTime<Utc>,
    },

    ConfigurationPersisted {
        round_number: u32,
        thread: Thread,
        at: DateTime<Utc>,
    },

    ConfigurationPersistFailed {
        round_number: u32,
        error: String,
        at: DateTime<Utc>,
    },

    ChangeRecordFetched {
        record: ChangeRecord,
        at: DateTime<Utc>,
    },

    ChangeRecordFetchFailed {
        round_number: u32,
        error: String,
        at: DateTime<Utc>,
    },

    ResearchStarted {
        round_number: u32,
        at: DateTime<Utc>,
    },

    ResearchCompleted {
        round_number: u32,
        result: ResearchResult,
        at: DateTime<Utc>,
    },

    ResearchFailed {
        round_number: u32,
        error: String,
        at: DateTime<Utc>,
    },

    ParticipantStreamStarted {
        round_number: u32,
        participant_index: usize,
        participant_id: String,
        message_id: String,
        at: DateTime<Utc>,
    },

    ParticipantChunk {
        round_number: u32,
        participant_index: usize,
        content: String,
    },

    ParticipantCompleted {
        round_number: u32,
        participant_index: usize,
        finish_reason: FinishReason,
        at: DateTime<Utc>,
    },

    ParticipantFailed {
        round_number: u32,
        participant_index: usize,
        error: String,
        at: DateTime<Utc>,
    },

    SynthesisStarted {
        round_number: u32,
        message_id: String,
        at: DateTime<Utc>,
    },

    SynthesisChunk {
        round_number: u32,
        content: String,
    },

    SynthesisCompleted {
        round_number: u32,
        at: DateTime<Utc>,
    },

    SynthesisFailed {
        round_number: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Persisted state loaded on (re)attachment
    Attached {
        snapshot: ThreadSnapshot,
        #[serde(default)]
        stream_statuses: Vec<StreamStatusEntry>,
        at: DateTime<Utc>,
    },

    Tick {
        at: DateTime<Utc>,
    },
}

impl RoundEvent {
    /// Timestamp carried by the event, if any
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::MessageSubmitted { at, .. }
            | Self::RoundRetryRequested { at, .. }
            | Self::RoundDiscarded { at, .. }
            | Self::RoundDiscardFailed { at, .. }
            | Self::ConnectivityChanged { at, .. }
            | Self::ThreadCreated { at, .. }
            | Self::ThreadCreationFailed { at, .. }
            | Self::TitleReady { at, .. }
            | Self::ConfigurationPersisted { at, .. }
            | Self::ConfigurationPersistFailed { at, .. }
            | Self::ChangeRecordFetched { at, .. }
            | Self::ChangeRecordFetchFailed { at, .. }
            | Self::ResearchStarted { at, .. }
            | Self::ResearchCompleted { at, .. }
            | Self::ResearchFailed { at, .. }
            | Self::ParticipantStreamStarted { at, .. }
            | Self::ParticipantCompleted { at, .. }
            | Self::ParticipantFailed { at, .. }
            | Self::SynthesisStarted { at, .. }
            | Self::SynthesisCompleted { at, .. }
            | Self::SynthesisFailed { at, .. }
            | Self::Attached { at, .. }
            | Self::Tick { at } => Some(*at),
            Self::WebSearchToggled { .. }
            | Self::ParticipantsUpdated { .. }
            | Self::ModeChanged { .. }
            | Self::ParticipantChunk { .. }
            | Self::SynthesisChunk { .. } => None,
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageSubmitted { .. } => "message_submitted",
            Self::WebSearchToggled { .. } => "web_search_toggled",
            Self::ParticipantsUpdated { .. } => "participants_updated",
            Self::ModeChanged { .. } => "mode_changed",
            Self::RoundRetryRequested { .. } => "round_retry_requested",
            Self::RoundDiscarded { .. } => "round_discarded",
            Self::RoundDiscardFailed { .. } => "round_discard_failed",
            Self::ConnectivityChanged { .. } => "connectivity_changed",
            Self::ThreadCreated { .. } => "thread_created",
            Self::ThreadCreationFailed { .. } => "thread_creation_failed",
            Self::TitleReady { .. } => "title_ready",
            Self::ConfigurationPersisted { .. } => "configuration_persisted",
            Self::ConfigurationPersistFailed { .. } => "configuration_persist_failed",
            Self::ChangeRecordFetched { .. } => "change_record_fetched",
            Self::ChangeRecordFetchFailed { .. } => "change_record_fetch_failed",
            Self::ResearchStarted { .. } => "research_started",
            Self::ResearchCompleted { .. } => "research_completed",
            Self::ResearchFailed { .. } => "research_failed",
            Self::ParticipantStreamStarted { .. } => "participant_stream_started",
            Self::ParticipantChunk { .. } => "participant_chunk",
            Self::ParticipantCompleted { .. } => "participant_completed",
            Self::ParticipantFailed { .. } => "participant_failed",
            Self::SynthesisStarted { .. } => "synthesis_started",
            Self::SynthesisChunk { .. } => "synthesis_chunk",
            Self::SynthesisCompleted { .. } => "synthesis_completed",
            Self::SynthesisFailed { .. } => "synthesis_failed",
            Self::Attached { .. } => "attached",
            Self::Tick { .. } => "tick",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RoundEvent::ParticipantCompleted {
            round_number: 2,
            participant_index: 1,
            finish_reason: FinishReason::Stop,
            at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "participant_completed");
        assert_eq!(json["finish_reason"], "stop");
        assert_eq!(event.kind(), "participant_completed");
    }

    #[test]
    fn test_command_deserializes() {
        let json = r#"{"type":"toggle_web_search","enabled":true}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(command, Command::ToggleWebSearch { enabled: true }));
    }
}
