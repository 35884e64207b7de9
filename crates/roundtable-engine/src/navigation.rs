use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roundtable_types::{RecordStatus, SynthesisRecord, TimeoutPolicy};

use crate::state::{elapsed, RoundState, ScreenMode};

/// Why the overview screen was left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationReason {
    SynthesisComplete,
    SynthesisFailed,
    /// Synthesis kept streaming past the streaming override
    StreamingOverride,
    /// Placeholder never filled while nothing streamed
    PlaceholderOverride,
    /// Ready synthesis never started streaming
    ReadyOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Stay,
    Navigate(NavigationReason),
}

/// Whether the overview screen may give way to the thread screen.
///
/// Every reason except the placeholder override also needs the AI title.
pub fn evaluate(state: &RoundState, policy: &TimeoutPolicy, now: DateTime<Utc>) -> NavigationDecision {
    if state.screen_mode != ScreenMode::Overview || state.has_early_optimistic_message {
        return NavigationDecision::Stay;
    }
    let Some(thread) = state.thread.as_ref() else {
        return NavigationDecision::Stay;
    };
    let Some(synthesis) = state
        .latest_round_number()
        .and_then(|round| state.synthesis(round))
    else {
        return NavigationDecision::Stay;
    };

    if let Some(reason) = counts_as_complete(synthesis, policy, now) {
        return if thread.title_ready() {
            NavigationDecision::Navigate(reason)
        } else {
            NavigationDecision::Stay
        };
    }

    if synthesis.is_placeholder()
        && !state.is_streaming
        && elapsed(synthesis.created_at, now) >= policy.placeholder_override
    {
        return NavigationDecision::Navigate(NavigationReason::PlaceholderOverride);
    }

    NavigationDecision::Stay
}

fn counts_as_complete(
    synthesis: &SynthesisRecord,
    policy: &TimeoutPolicy,
    now: DateTime<Utc>,
) -> Option<NavigationReason> {
    match synthesis.status {
        RecordStatus::Complete => Some(NavigationReason::SynthesisComplete),
        RecordStatus::Failed => Some(NavigationReason::SynthesisFailed),
        RecordStatus::Streaming => {
            let started_at = synthesis.streaming_started_at?;
            (elapsed(started_at, now) >= policy.synthesis_streaming_override)
                .then_some(NavigationReason::StreamingOverride)
        }
        RecordStatus::Pending => {
            let limit = policy.ready_synthesis_override?;
            let ready_at = synthesis.ready_at?;
            (synthesis.is_ready() && elapsed(ready_at, now) >= limit)
                .then_some(NavigationReason::ReadyOverride)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use roundtable_types::{Message, Thread};

    fn overview(title_ready: bool, at: DateTime<Utc>) -> RoundState {
        let mut thread = Thread::new("t", "slug", at);
        if title_ready {
            thread.title = Some("Title".to_string());
            thread.is_ai_generated_title = true;
        }
        let mut state = RoundState::new();
        state.set_thread(thread);
        state.upsert_message(Message::user("u0", "t", 0, "q", at));
        state.set_synthesis(SynthesisRecord::placeholder("s0", "t", 0, at));
        state
    }

    #[test]
    fn test_complete_synthesis_needs_title() {
        let now = Utc::now();
        let policy = TimeoutPolicy::default();
        let mut state = overview(false, now);
        state.synthesis_mut(0).unwrap().populate(vec!["m0".into()], now);
        state.synthesis_mut(0).unwrap().complete(now);

        assert_eq!(evaluate(&state, &policy, now), NavigationDecision::Stay);

        state.thread.as_mut().unwrap().title = Some("Title".into());
        state.thread.as_mut().unwrap().is_ai_generated_title = true;
        assert_eq!(
            evaluate(&state, &policy, now),
            NavigationDecision::Navigate(NavigationReason::SynthesisComplete)
        );
    }

    #[test]
    fn test_failed_synthesis_navigates() {
        let now = Utc::now();
        let mut state = overview(true, now);
        state.synthesis_mut(0).unwrap().fail("boom", now);

        assert_eq!(
            evaluate(&state, &TimeoutPolicy::default(), now),
            NavigationDecision::Navigate(NavigationReason::SynthesisFailed)
        );
    }

    #[test]
    fn test_placeholder_override_after_fifteen_seconds() {
        let start = Utc::now();
        let policy = TimeoutPolicy::default();
        let state = overview(false, start);

        assert_eq!(evaluate(&state, &policy, start + Duration::seconds(14)), NavigationDecision::Stay);
        assert_eq!(
            evaluate(&state, &policy, start + Duration::seconds(15)),
            NavigationDecision::Navigate(NavigationReason::PlaceholderOverride)
        );
    }

    #[test]
    fn test_placeholder_override_suppressed_while_streaming() {
        let start = Utc::now();
        let mut state = overview(false, start);
        state.is_streaming = true;

        assert_eq!(
            evaluate(&state, &TimeoutPolicy::default(), start + Duration::seconds(40)),
            NavigationDecision::Stay
        );
    }

    #[test]
    fn test_placeholder_override_never_fires_once_ready() {
        let start = Utc::now();
        let policy = TimeoutPolicy::default().with_ready_synthesis_override(None);
        let mut state = overview(true, start);
        state.synthesis_mut(0).unwrap().populate(vec!["m0".into()], start);

        assert_eq!(evaluate(&state, &policy, start + Duration::seconds(300)), NavigationDecision::Stay);
    }

    #[test]
    fn test_streaming_and_ready_overrides() {
        let start = Utc::now();
        let policy = TimeoutPolicy::default();
        let mut state = overview(true, start);
        state.synthesis_mut(0).unwrap().populate(vec!["m0".into()], start);

        assert_eq!(evaluate(&state, &policy, start + Duration::seconds(59)), NavigationDecision::Stay);
        assert_eq!(
            evaluate(&state, &policy, start + Duration::seconds(60)),
            NavigationDecision::Navigate(NavigationReason::ReadyOverride)
        );

        state.synthesis_mut(0).unwrap().start_streaming(start);
        assert_eq!(
            evaluate(&state, &policy, start + Duration::seconds(61)),
            NavigationDecision::Navigate(NavigationReason::StreamingOverride)
        );
    }

    #[test]
    fn test_thread_screen_stays() {
        let now = Utc::now();
        let mut state = overview(true, now);
        state.synthesis_mut(0).unwrap().fail("x", now);
        state.screen_mode = ScreenMode::Thread;

        assert_eq!(evaluate(&state, &TimeoutPolicy::default(), now), NavigationDecision::Stay);
    }
}
