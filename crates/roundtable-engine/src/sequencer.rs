//! Participant sequencer.
//!
//! Participants of a round stream one at a time in roster order. Participant
//! `k + 1` may only start once `k` is terminal: its message is complete or
//! errored, or its stream ended during this attachment (empty or interrupted
//! responses count as ended and are not retried).

use roundtable_llm::ParticipantRequest;
use roundtable_types::{FinishReason, Message, Participant};

use crate::state::RoundState;
use crate::triggers::Subsystem;

#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantStep {
    Start { index: usize, participant: Participant },
    /// A participant of the round is still streaming
    Wait,
    /// Every expected participant is terminal
    Done,
}

pub fn is_participant_terminal(
    state: &RoundState,
    round_number: u32,
    index: usize,
    participant: &Participant,
) -> bool {
    if state.is_stream_settled(round_number, index) {
        return true;
    }
    state
        .participant_message(round_number, index)
        .map(|m| m.participant_id.as_deref() == Some(participant.id.as_str()) && is_answered(m))
        .unwrap_or(false)
}

/// A persisted participant message that finished for good.
///
/// A "finished" message without content never really started and is streamed
/// again at the same index; errored messages stay terminal.
pub fn is_answered(message: &Message) -> bool {
    match message.finish_reason {
        Some(FinishReason::Error) => true,
        _ => message.is_complete() && !message.content.trim().is_empty(),
    }
}

/// First roster index that is not terminal yet
pub fn next_index(state: &RoundState, round_number: u32) -> Option<usize> {
    state
        .round_roster(round_number)
        .iter()
        .enumerate()
        .find(|(index, p)| !is_participant_terminal(state, round_number, *index, p))
        .map(|(index, _)| index)
}

/// Every expected participant, by count and identity, is terminal
pub fn all_terminal(state: &RoundState, round_number: u32) -> bool {
    next_index(state, round_number).is_none()
}

pub fn decide(state: &RoundState, round_number: u32) -> ParticipantStep {
    if state.is_streaming {
        return ParticipantStep::Wait;
    }

    let roster = state.round_roster(round_number);
    match next_index(state, round_number) {
        None => ParticipantStep::Done,
        Some(index) => {
            if state
                .triggers
                .has_triggered(Subsystem::Participant(index), round_number)
            {
                return ParticipantStep::Wait;
            }
            match roster.into_iter().nth(index) {
                Some(participant) => ParticipantStep::Start { index, participant },
                None => ParticipantStep::Done,
            }
        }
    }
}

/// Ids of the round's participant messages in roster order
pub fn participant_message_ids(state: &RoundState, round_number: u32) -> Vec<String> {
    let roster = state.round_roster(round_number);
    (0..roster.len())
        .filter_map(|index| state.participant_message(round_number, index))
        .map(|m| m.id.clone())
        .collect()
}

/// Thread history in display order, up to and excluding participant `index`
/// of `round_number`
pub fn history_before(state: &RoundState, round_number: u32, index: usize) -> Vec<Message> {
    let mut history: Vec<Message> = state
        .messages
        .iter()
        .filter(|m| {
            if m.round_number < round_number {
                return !m.content.is_empty();
            }
            if m.round_number > round_number {
                return false;
            }
            m.is_user() || (m.is_participant() && m.participant_index.unwrap_or(usize::MAX) < index && m.is_settled())
        })
        .cloned()
        .collect();
    history.sort_by_key(display_rank);
    history
}

/// Sort key: round, then user, participants by index, moderator last
pub(crate) fn display_rank(message: &Message) -> (u32, usize) {
    let rank = if message.is_user() {
        0
    } else if message.is_moderator {
        usize::MAX
    } else {
        message.participant_index.map(|i| i + 1).unwrap_or(usize::MAX - 1)
    };
    (message.round_number, rank)
}

pub fn build_request(
    state: &RoundState,
    round_number: u32,
    index: usize,
    participant: Participant,
) -> ParticipantRequest {
    let thread_id = state.thread_id().unwrap_or_default().to_string();
    ParticipantRequest::new(thread_id, round_number, index, participant)
        .with_mode(state.config.mode)
        .with_history(history_before(state, round_number, index))
        .with_research(state.research(round_number).and_then(|r| r.result.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roundtable_types::FinishReason;

    fn state_with_roster(count: usize) -> RoundState {
        let mut state = RoundState::new();
        let roster: Vec<Participant> = (0..count)
            .map(|i| Participant::new(format!("p-{}", i), format!("model-{}", i), i as u32))
            .collect();
        state.set_round_roster(0, roster);
        state.upsert_message(Message::user("u0", "t", 0, "question", Utc::now()));
        state
    }

    fn answer(index: usize, reason: FinishReason) -> Message {
        Message::participant(format!("m-{}", index), "t", 0, index, format!("p-{}", index), Utc::now())
            .with_content("answer")
            .with_finish_reason(reason)
    }

    #[test]
    fn test_starts_at_zero() {
        let state = state_with_roster(3);
        match decide(&state, 0) {
            ParticipantStep::Start { index, participant } => {
                assert_eq!(index, 0);
                assert_eq!(participant.id, "p-0");
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_waits_while_streaming_or_triggered() {
        let mut state = state_with_roster(3);
        state.is_streaming = true;
        assert_eq!(decide(&state, 0), ParticipantStep::Wait);

        state.is_streaming = false;
        state.triggers.try_acquire(Subsystem::Participant(0), 0);
        assert_eq!(decide(&state, 0), ParticipantStep::Wait);
    }

    #[test]
    fn test_errored_participant_advances() {
        let mut state = state_with_roster(3);
        state.upsert_message(answer(0, FinishReason::Error));
        assert_eq!(next_index(&state, 0), Some(1));
    }

    #[test]
    fn test_unknown_finish_needs_settled_stream() {
        let mut state = state_with_roster(2);
        state.upsert_message(answer(0, FinishReason::Unknown));
        assert_eq!(next_index(&state, 0), Some(0));

        state.mark_stream_settled(0, 0);
        assert_eq!(next_index(&state, 0), Some(1));
    }

    #[test]
    fn test_identity_mismatch_is_not_terminal() {
        let mut state = state_with_roster(1);
        let foreign = Message::participant("m-x", "t", 0, 0, "someone-else", Utc::now())
            .with_content("hi")
            .with_finish_reason(FinishReason::Stop);
        state.upsert_message(foreign);
        assert!(!all_terminal(&state, 0));
    }

    #[test]
    fn test_done_and_ids_in_order() {
        let mut state = state_with_roster(2);
        state.upsert_message(answer(1, FinishReason::Stop));
        state.upsert_message(answer(0, FinishReason::Length));

        assert_eq!(decide(&state, 0), ParticipantStep::Done);
        assert_eq!(participant_message_ids(&state, 0), vec!["m-0", "m-1"]);
    }

    #[test]
    fn test_history_excludes_later_participants() {
        let mut state = state_with_roster(3);
        state.upsert_message(answer(0, FinishReason::Stop));
        state.upsert_message(answer(1, FinishReason::Stop));

        let history = history_before(&state, 0, 1);
        let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u0", "m-0"]);
    }
}
