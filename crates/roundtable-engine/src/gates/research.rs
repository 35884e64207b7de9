use roundtable_types::{RecordStatus, ResearchRecord};

use crate::state::RoundState;
use crate::triggers::Subsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchDecision {
    /// No research, or research already settled (failure included)
    Proceed,
    /// Pending and nobody has started it yet
    Start,
    /// Pending with a start already issued, or streaming
    Wait,
}

pub fn evaluate(state: &RoundState, round_number: u32) -> ResearchDecision {
    match state.research(round_number).map(|r| r.status) {
        None => ResearchDecision::Proceed,
        Some(RecordStatus::Complete) | Some(RecordStatus::Failed) => ResearchDecision::Proceed,
        Some(RecordStatus::Streaming) => ResearchDecision::Wait,
        Some(RecordStatus::Pending) => {
            if state.has_research_been_triggered(round_number) {
                ResearchDecision::Wait
            } else {
                ResearchDecision::Start
            }
        }
    }
}

/// Participants of the round may begin
pub fn allows_streaming(state: &RoundState, round_number: u32) -> bool {
    evaluate(state, round_number) == ResearchDecision::Proceed
}

/// Create the round's research record unless one exists.
///
/// Returns `false` when the insert was dropped.
pub fn create(state: &mut RoundState, record: ResearchRecord) -> bool {
    if state.research(record.round_number).is_some() {
        return false;
    }
    state.set_research(record);
    true
}

/// Claim the right to start research for a round; only one caller wins
pub fn try_start(state: &mut RoundState, round_number: u32) -> bool {
    state.triggers.try_acquire(Subsystem::Research, round_number)
}
