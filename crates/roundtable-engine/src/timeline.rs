use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use roundtable_types::{ChangeRecord, Message, ResearchRecord};

use crate::sequencer::display_rank;
use crate::state::RoundState;

/// One display block of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineItem {
    ChangeNote {
        round_number: u32,
        record: ChangeRecord,
    },
    Messages {
        round_number: u32,
        user: Option<Message>,
        participants: Vec<Message>,
        moderator: Option<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        research: Option<ResearchRecord>,
    },
    /// Research of a round that has no messages to attach it to
    OrphanedResearch {
        round_number: u32,
        record: ResearchRecord,
    },
}

impl TimelineItem {
    pub fn round_number(&self) -> u32 {
        match self {
            TimelineItem::ChangeNote { round_number, .. }
            | TimelineItem::Messages { round_number, .. }
            | TimelineItem::OrphanedResearch { round_number, .. } => *round_number,
        }
    }
}

/// Project the container into display blocks, rounds ascending
pub fn assemble(state: &RoundState) -> Vec<TimelineItem> {
    let rounds: BTreeSet<u32> = state
        .messages
        .iter()
        .map(|m| m.round_number)
        .chain(state.research.keys().copied())
        .chain(state.change_records.keys().copied())
        .collect();

    let mut items = Vec::new();
    for round_number in rounds {
        if round_number > 0 {
            if let Some(record) = state.change_record(round_number) {
                items.push(TimelineItem::ChangeNote {
                    round_number,
                    record: record.clone(),
                });
            }
        }

        let mut messages: Vec<&Message> = state.round_messages(round_number).collect();
        let research = state.research(round_number).cloned();

        if messages.is_empty() {
            if let Some(record) = research {
                items.push(TimelineItem::OrphanedResearch {
                    round_number,
                    record,
                });
            }
            continue;
        }

        messages.sort_by_key(|m| display_rank(m));
        items.push(TimelineItem::Messages {
            round_number,
            user: messages.iter().find(|m| m.is_user()).map(|m| (*m).clone()),
            participants: messages
                .iter()
                .filter(|m| m.is_participant())
                .map(|m| (*m).clone())
                .collect(),
            moderator: messages.iter().find(|m| m.is_moderator).map(|m| (*m).clone()),
            research,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roundtable_types::ConfigChange;

    #[test]
    fn test_groups_rounds_in_order() {
        let now = Utc::now();
        let mut state = RoundState::new();
        state.upsert_message(Message::user("u1", "t", 1, "second", now));
        state.upsert_message(Message::moderator("s0", "t", 0, now));
        state.upsert_message(Message::participant("m01", "t", 0, 1, "p1", now));
        state.upsert_message(Message::participant("m00", "t", 0, 0, "p0", now));
        state.upsert_message(Message::user("u0", "t", 0, "first", now));
        state.set_change_record(ChangeRecord {
            id: "c1".into(),
            thread_id: "t".into(),
            round_number: 1,
            previous_round_number: Some(0),
            changes: vec![ConfigChange::WebSearchToggled { enabled: true }],
            created_at: now,
        });

        let items = assemble(&state);
        assert_eq!(items.len(), 3);

        match &items[0] {
            TimelineItem::Messages {
                user,
                participants,
                moderator,
                ..
            } => {
                assert_eq!(user.as_ref().map(|m| m.id.as_str()), Some("u0"));
                let ids: Vec<&str> = participants.iter().map(|m| m.id.as_str()).collect();
                assert_eq!(ids, vec!["m00", "m01"]);
                assert_eq!(moderator.as_ref().map(|m| m.id.as_str()), Some("s0"));
            }
            other => panic!("unexpected item {:?}", other),
        }
        assert!(matches!(items[1], TimelineItem::ChangeNote { round_number: 1, .. }));
        assert!(matches!(items[2], TimelineItem::Messages { round_number: 1, .. }));
    }

    #[test]
    fn test_research_attached_or_orphaned() {
        let now = Utc::now();
        let mut state = RoundState::new();
        state.upsert_message(Message::user("u0", "t", 0, "q", now));
        state.set_research(ResearchRecord::pending("r0", "t", 0, "q", now));
        state.set_research(ResearchRecord::pending("r2", "t", 2, "q", now));

        let items = assemble(&state);
        assert!(matches!(
            &items[0],
            TimelineItem::Messages { research: Some(r), .. } if r.id == "r0"
        ));
        assert!(matches!(items[1], TimelineItem::OrphanedResearch { round_number: 2, .. }));
    }

    #[test]
    fn test_no_change_note_for_round_zero() {
        let now = Utc::now();
        let mut state = RoundState::new();
        state.upsert_message(Message::user("u0", "t", 0, "q", now));
        state.set_change_record(ChangeRecord {
            id: "c0".into(),
            thread_id: "t".into(),
            round_number: 0,
            previous_round_number: None,
            changes: Vec::new(),
            created_at: now,
        });

        let items = assemble(&state);
        assert_eq!(items.len(), 1);
    }
}
