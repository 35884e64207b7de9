//! Resumption detector.
//!
//! Runs once per (re)attachment and inspects only the latest round. It
//! produces a single next action; the reducer carries it out.

use serde::{Deserialize, Serialize};

use roundtable_types::{
    roster, RecordStatus, StreamKey, StreamStatus, StreamStatusEntry, StreamTarget,
};

use crate::sequencer::is_answered;
use crate::state::RoundState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoThread,
    EarlyOptimisticMessage,
    AlreadyStreaming,
    /// Persisted participant identities no longer match the configured roster
    RosterMismatch,
    /// A participant that already answered has been disabled since
    ParticipantDisabled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeAction {
    Skip(SkipReason),
    /// Nothing left to do in the latest round
    None,
    /// Research is running elsewhere; watch it without re-running it
    ObserveResearch { round_number: u32 },
    /// Research never started anywhere; hand it to the research gate
    StartResearch { round_number: u32 },
    ResumeParticipant { round_number: u32, index: usize },
    ResumeSynthesis { round_number: u32 },
    /// The stream is still producing output somewhere else
    AwaitActiveStream { key: StreamKey },
    /// The stream finished but the snapshot predates it
    Reload,
}

pub fn detect(state: &RoundState, statuses: &[StreamStatusEntry]) -> ResumeAction {
    let Some(thread_id) = state.thread_id() else {
        return ResumeAction::Skip(SkipReason::NoThread);
    };
    if state.has_early_optimistic_message {
        return ResumeAction::Skip(SkipReason::EarlyOptimisticMessage);
    }
    if state.is_streaming {
        return ResumeAction::Skip(SkipReason::AlreadyStreaming);
    }
    let Some(round_number) = state.latest_round_number() else {
        return ResumeAction::None;
    };

    let status_of = |target: StreamTarget| {
        statuses
            .iter()
            .find(|e| e.key.round_number == round_number && e.key.target == target)
            .map(|e| e.status)
            .unwrap_or_default()
    };

    if let Some(research) = state.research(round_number) {
        match research.status {
            RecordStatus::Streaming => return ResumeAction::ObserveResearch { round_number },
            // A pending record may already be executing for another attachment
            RecordStatus::Pending => {
                return match status_of(StreamTarget::Research) {
                    StreamStatus::NotStarted => ResumeAction::StartResearch { round_number },
                    _ => ResumeAction::ObserveResearch { round_number },
                }
            }
            RecordStatus::Complete | RecordStatus::Failed => {}
        }
    }

    if let Some(reason) = roster_guard(state, round_number) {
        return ResumeAction::Skip(reason);
    }

    let roster = roster(&state.config.participants);
    let next = roster.iter().enumerate().find(|(index, p)| {
        !state
            .participant_message(round_number, *index)
            .map(|m| m.participant_id.as_deref() == Some(p.id.as_str()) && is_answered(m))
            .unwrap_or(false)
    });

    if let Some((index, _)) = next {
        let target = StreamTarget::Participant { index };
        return match status_of(target) {
            StreamStatus::Active => ResumeAction::AwaitActiveStream {
                key: StreamKey::new(thread_id, round_number, target),
            },
            StreamStatus::Completed if !state.reload_attempted => ResumeAction::Reload,
            _ => ResumeAction::ResumeParticipant {
                round_number,
                index,
            },
        };
    }

    let synthesis_done = state
        .synthesis(round_number)
        .map(|s| s.status.is_terminal())
        .unwrap_or(false);
    if synthesis_done {
        return ResumeAction::None;
    }

    match status_of(StreamTarget::Synthesis) {
        StreamStatus::Active => ResumeAction::AwaitActiveStream {
            key: StreamKey::new(thread_id, round_number, StreamTarget::Synthesis),
        },
        StreamStatus::Completed if !state.reload_attempted => ResumeAction::Reload,
        _ => ResumeAction::ResumeSynthesis { round_number },
    }
}

/// Persisted participant messages must line up with the configured roster
fn roster_guard(state: &RoundState, round_number: u32) -> Option<SkipReason> {
    let roster = roster(&state.config.participants);

    for message in state.round_messages(round_number).filter(|m| m.is_participant()) {
        let Some(participant_id) = message.participant_id.as_deref() else {
            continue;
        };
        let disabled = state
            .config
            .participants
            .iter()
            .any(|p| p.id == participant_id && !p.is_enabled);
        if disabled {
            return Some(SkipReason::ParticipantDisabled);
        }

        let expected = message
            .participant_index
            .and_then(|index| roster.get(index))
            .map(|p| p.id.as_str());
        if expected != Some(participant_id) {
            return Some(SkipReason::RosterMismatch);
        }
    }
    None
}
