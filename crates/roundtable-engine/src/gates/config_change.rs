use chrono::{DateTime, Utc};

use roundtable_types::{ChangeRecord, TimeoutPolicy};

use crate::state::{elapsed, RoundState};

/// A configuration block released by the safety net instead of a change record
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChangeTimeout {
    pub round_number: u32,
    pub waited: std::time::Duration,
    pub was_waiting_for_changelog: bool,
}

/// Set the pending marker for `round_number`
pub fn begin(state: &mut RoundState, round_number: u32, at: DateTime<Utc>) {
    state.config_change_round_number = Some(round_number);
    state.config_change_started_at = Some(at);
    state.is_waiting_for_changelog = false;
}

/// The round may not research or stream yet.
///
/// Only the round the marker names is blocked, so a marker left behind by an
/// earlier round never gates a later one.
pub fn is_blocked(state: &RoundState, round_number: u32) -> bool {
    state.config_change_round_number == Some(round_number)
}

/// Configuration of `round_number` was persisted.
///
/// Returns `true` when the change record should now be fetched.
pub fn on_persisted(state: &mut RoundState, round_number: u32) -> bool {
    if state.config_change_round_number != Some(round_number) {
        return false;
    }
    state.is_waiting_for_changelog = true;
    true
}

/// Store the change record and lift the block it was holding.
///
/// Returns `true` when a block was lifted.
pub fn on_change_record(state: &mut RoundState, record: ChangeRecord) -> bool {
    let round_number = record.round_number;
    if state.change_record(round_number).is_none() {
        state.set_change_record(record);
    }

    if state.config_change_round_number == Some(round_number) {
        clear(state);
        true
    } else {
        false
    }
}

pub fn clear(state: &mut RoundState) {
    state.config_change_round_number = None;
    state.config_change_started_at = None;
    state.is_waiting_for_changelog = false;
}

/// Force-clear a block held longer than the policy allows
pub fn check_timeout(
    state: &mut RoundState,
    policy: &TimeoutPolicy,
    now: DateTime<Utc>,
) -> Option<ConfigChangeTimeout> {
    let round_number = state.config_change_round_number?;
    let started_at = state.config_change_started_at?;
    let waited = elapsed(started_at, now);
    if waited < policy.config_change_timeout {
        return None;
    }

    let timeout = ConfigChangeTimeout {
        round_number,
        waited,
        was_waiting_for_changelog: state.is_waiting_for_changelog,
    };
    clear(state);
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(round_number: u32) -> ChangeRecord {
        ChangeRecord {
            id: format!("c-{}", round_number),
            thread_id: "t".to_string(),
            round_number,
            previous_round_number: round_number.checked_sub(1),
            changes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_marker_blocks_only_its_round() {
        let mut state = RoundState::new();
        begin(&mut state, 3, Utc::now());

        assert!(is_blocked(&state, 3));
        assert!(!is_blocked(&state, 4));
        assert!(!is_blocked(&state, 2));
    }

    #[test]
    fn test_persisted_then_change_record_clears() {
        let mut state = RoundState::new();
        begin(&mut state, 1, Utc::now());

        assert!(on_persisted(&mut state, 1));
        assert!(state.is_waiting_for_changelog);
        assert!(is_blocked(&state, 1));

        assert!(on_change_record(&mut state, record(1)));
        assert!(!is_blocked(&state, 1));
        assert!(!state.is_waiting_for_changelog);
        assert!(state.change_record(1).is_some());
    }

    #[test]
    fn test_stale_persist_does_not_set_waiting() {
        let mut state = RoundState::new();
        begin(&mut state, 2, Utc::now());

        assert!(!on_persisted(&mut state, 1));
        assert!(!state.is_waiting_for_changelog);
    }

    #[test]
    fn test_duplicate_change_record_keeps_first() {
        let mut state = RoundState::new();
        let mut first = record(1);
        first.id = "first".to_string();
        on_change_record(&mut state, first);
        on_change_record(&mut state, record(1));

        assert_eq!(state.change_record(1).map(|c| c.id.as_str()), Some("first"));
    }

    #[test]
    fn test_timeout_force_clears_after_policy() {
        let policy = TimeoutPolicy::default();
        let start = Utc::now();
        let mut state = RoundState::new();
        begin(&mut state, 1, start);
        on_persisted(&mut state, 1);

        assert!(check_timeout(&mut state, &policy, start + Duration::seconds(29)).is_none());
        assert!(is_blocked(&state, 1));

        let timeout = check_timeout(&mut state, &policy, start + Duration::seconds(30)).unwrap();
        assert_eq!(timeout.round_number, 1);
        assert!(timeout.was_waiting_for_changelog);
        assert!(!is_blocked(&state, 1));
    }
}
