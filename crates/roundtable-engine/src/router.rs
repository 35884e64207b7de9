use roundtable_types::Participant;

use crate::gates::{config_change, research, ResearchDecision};
use crate::sequencer::{self, ParticipantStep};
use crate::state::RoundState;
use crate::synthesis::{self, SynthesisStep};

/// Decides what the driven round needs next
pub trait Router: Send + Sync {
    fn next(&self, state: &RoundState, round_number: u32) -> NextStep;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// Thread not created server-side yet
    AwaitThread,
    /// Responses of a regenerated round are still being dropped
    AwaitDiscard,
    BlockedByConfiguration,
    AwaitRemoteStream,
    StartResearch,
    AwaitResearch,
    StreamParticipant { index: usize, participant: Participant },
    AwaitParticipant,
    StartSynthesis,
    AwaitSynthesis,
    RoundComplete,
}

/// Config change -> research -> participants -> synthesis
pub struct RoundRouter;

impl Router for RoundRouter {
    fn next(&self, state: &RoundState, round_number: u32) -> NextStep {
        if state.thread.is_none() || state.has_early_optimistic_message {
            return NextStep::AwaitThread;
        }
        if state.discarding_round == Some(round_number) {
            return NextStep::AwaitDiscard;
        }
        if config_change::is_blocked(state, round_number) {
            return NextStep::BlockedByConfiguration;
        }
        if state
            .awaiting_stream
            .as_ref()
            .map(|key| key.round_number == round_number)
            .unwrap_or(false)
        {
            return NextStep::AwaitRemoteStream;
        }

        match research::evaluate(state, round_number) {
            ResearchDecision::Start => return NextStep::StartResearch,
            ResearchDecision::Wait => return NextStep::AwaitResearch,
            ResearchDecision::Proceed => {}
        }

        match sequencer::decide(state, round_number) {
            ParticipantStep::Start { index, participant } => {
                return NextStep::StreamParticipant { index, participant }
            }
            ParticipantStep::Wait => return NextStep::AwaitParticipant,
            ParticipantStep::Done => {}
        }

        match synthesis::decide(state, round_number) {
            SynthesisStep::Start => NextStep::StartSynthesis,
            SynthesisStep::Wait => NextStep::AwaitSynthesis,
            SynthesisStep::Done => NextStep::RoundComplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roundtable_types::{Message, ResearchRecord, RoundConfig, SynthesisRecord, Thread};

    fn running_round() -> RoundState {
        let config = RoundConfig::new(vec![Participant::new("p-0", "model", 0)], Default::default(), true);
        let mut state = RoundState::with_config(config);
        state.set_thread(Thread::new("t", "slug", Utc::now()));
        state.upsert_message(Message::user("u1", "t", 1, "q", Utc::now()));
        state.set_research(ResearchRecord::pending("r1", "t", 1, "q", Utc::now()));
        state.set_synthesis(SynthesisRecord::placeholder("s1", "t", 1, Utc::now()));
        state
    }

    #[test]
    fn test_configuration_block_precedes_research() {
        let mut state = running_round();
        config_change::begin(&mut state, 1, Utc::now());

        assert_eq!(RoundRouter.next(&state, 1), NextStep::BlockedByConfiguration);

        config_change::clear(&mut state);
        assert_eq!(RoundRouter.next(&state, 1), NextStep::StartResearch);
    }

    #[test]
    fn test_research_precedes_participants() {
        let mut state = running_round();
        research::try_start(&mut state, 1);
        assert_eq!(RoundRouter.next(&state, 1), NextStep::AwaitResearch);

        state.research_mut(1).unwrap().fail("offline", Utc::now());
        assert!(matches!(
            RoundRouter.next(&state, 1),
            NextStep::StreamParticipant { index: 0, .. }
        ));
    }

    #[test]
    fn test_waits_for_thread_creation() {
        let mut state = running_round();
        state.has_early_optimistic_message = true;
        assert_eq!(RoundRouter.next(&state, 1), NextStep::AwaitThread);
    }
}
