use chrono::{DateTime, Utc};

use roundtable_llm::SynthesisRequest;
use roundtable_types::{Message, RecordStatus, SynthesisRecord};

use crate::sequencer;
use crate::state::RoundState;
use crate::triggers::Subsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStep {
    Start,
    /// Participants still running, or the synthesis stream is in flight
    Wait,
    /// Synthesis is complete or failed
    Done,
}

/// Placeholder id used when a round reaches synthesis without a record
pub fn placeholder_id(thread_id: &str, round_number: u32) -> String {
    format!("synthesis-{}-{}", thread_id, round_number)
}

/// Fill the round's placeholder with its participant message ids once every
/// expected participant is terminal
pub fn populate_if_ready(state: &mut RoundState, round_number: u32, at: DateTime<Utc>) -> bool {
    if !sequencer::all_terminal(state, round_number) {
        return false;
    }
    let ids = sequencer::participant_message_ids(state, round_number);
    if ids.is_empty() {
        return false;
    }

    if state.synthesis(round_number).is_none() {
        let thread_id = state.thread_id().unwrap_or_default().to_string();
        state.set_synthesis(SynthesisRecord::placeholder(
            placeholder_id(&thread_id, round_number),
            thread_id,
            round_number,
            at,
        ));
    }
    match state.synthesis_mut(round_number) {
        Some(record) if record.status == RecordStatus::Pending => {
            record.populate(ids, at);
            true
        }
        _ => false,
    }
}

pub fn decide(state: &RoundState, round_number: u32) -> SynthesisStep {
    let Some(record) = state.synthesis(round_number) else {
        return SynthesisStep::Wait;
    };

    match record.status {
        RecordStatus::Complete | RecordStatus::Failed => SynthesisStep::Done,
        RecordStatus::Streaming => SynthesisStep::Wait,
        RecordStatus::Pending => {
            if !record.is_ready()
                || !sequencer::all_terminal(state, round_number)
                || state.is_streaming
                || state.has_synthesis_been_triggered(round_number)
            {
                SynthesisStep::Wait
            } else {
                SynthesisStep::Start
            }
        }
    }
}

/// Claim the single synthesis start of a round
pub fn try_start(state: &mut RoundState, round_number: u32) -> bool {
    state.triggers.try_acquire(Subsystem::Synthesis, round_number)
}

pub fn build_request(state: &RoundState, round_number: u32) -> SynthesisRequest {
    let thread_id = state.thread_id().unwrap_or_default().to_string();
    let user_query = state
        .user_message(round_number)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let ids = state
        .synthesis(round_number)
        .map(|s| s.participant_message_ids.clone())
        .unwrap_or_default();
    let participant_messages: Vec<Message> = ids
        .iter()
        .filter_map(|id| state.messages.iter().find(|m| &m.id == id))
        .cloned()
        .collect();

    SynthesisRequest::new(thread_id, round_number, user_query)
        .with_mode(state.config.mode)
        .with_participant_messages(participant_messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundtable_types::{FinishReason, Participant};

    fn round_with(count: usize) -> RoundState {
        let mut state = RoundState::new();
        let roster = (0..count)
            .map(|i| Participant::new(format!("p-{}", i), "model", i as u32))
            .collect();
        state.set_round_roster(0, roster);
        state.upsert_message(Message::user("u0", "t", 0, "why?", Utc::now()));
        state.set_synthesis(SynthesisRecord::placeholder("s0", "t", 0, Utc::now()));
        state
    }

    fn finish(state: &mut RoundState, index: usize) {
        state.upsert_message(
            Message::participant(format!("m-{}", index), "t", 0, index, format!("p-{}", index), Utc::now())
                .with_content("because")
                .with_finish_reason(FinishReason::Stop),
        );
    }

    #[test]
    fn test_placeholder_waits_until_all_participants_terminal() {
        let mut state = round_with(2);
        finish(&mut state, 0);

        assert!(!populate_if_ready(&mut state, 0, Utc::now()));
        assert!(state.synthesis(0).unwrap().is_placeholder());
        assert_eq!(decide(&state, 0), SynthesisStep::Wait);

        finish(&mut state, 1);
        assert!(populate_if_ready(&mut state, 0, Utc::now()));
        assert_eq!(decide(&state, 0), SynthesisStep::Start);
    }

    #[test]
    fn test_start_is_claimed_once() {
        let mut state = round_with(1);
        finish(&mut state, 0);
        populate_if_ready(&mut state, 0, Utc::now());

        assert!(try_start(&mut state, 0));
        assert!(!try_start(&mut state, 0));
        assert_eq!(decide(&state, 0), SynthesisStep::Wait);
    }

    #[test]
    fn test_failed_synthesis_is_done() {
        let mut state = round_with(1);
        finish(&mut state, 0);
        populate_if_ready(&mut state, 0, Utc::now());
        state.synthesis_mut(0).unwrap().fail("moderator error", Utc::now());

        assert_eq!(decide(&state, 0), SynthesisStep::Done);
    }

    #[test]
    fn test_request_carries_participant_messages() {
        let mut state = round_with(2);
        finish(&mut state, 0);
        finish(&mut state, 1);
        populate_if_ready(&mut state, 0, Utc::now());

        let request = build_request(&state, 0);
        assert_eq!(request.user_query, "why?");
        assert_eq!(request.participant_messages.len(), 2);
    }
}
