use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thread::{ChatMode, Participant};

/// Lifecycle shared by research and synthesis records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Streaming,
    Complete,
    Failed,
}

impl RecordStatus {
    /// `Pending` or `Streaming`
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RecordStatus::Pending | RecordStatus::Streaming)
    }

    /// `Complete` or `Failed`
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResearchResult {
    pub queries: Vec<String>,
    pub summary: String,
    pub sources: Vec<ResearchSource>,
}

/// Web research performed before participants speak
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchRecord {
    pub id: String,
    pub thread_id: String,
    pub round_number: u32,
    pub status: RecordStatus,
    pub user_query: String,
    pub result: Option<ResearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchRecord {
    pub fn pending(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        round_number: u32,
        user_query: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            round_number,
            status: RecordStatus::Pending,
            user_query: user_query.into(),
            result: None,
            error_message: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result: ResearchResult, at: DateTime<Utc>) {
        self.status = RecordStatus::Complete;
        self.result = Some(result);
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = RecordStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(at);
    }
}

/// Moderator summary of a round.
///
/// An empty `participant_message_ids` marks a placeholder that must not be
/// streamed until the round's participant messages are known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisRecord {
    pub id: String,
    pub thread_id: String,
    pub round_number: u32,
    pub status: RecordStatus,
    pub participant_message_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub streaming_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SynthesisRecord {
    pub fn placeholder(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        round_number: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            round_number,
            status: RecordStatus::Pending,
            participant_message_ids: Vec::new(),
            error_message: None,
            created_at,
            ready_at: None,
            streaming_started_at: None,
            completed_at: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.status == RecordStatus::Pending && self.participant_message_ids.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        !self.participant_message_ids.is_empty()
    }

    pub fn populate(&mut self, message_ids: Vec<String>, at: DateTime<Utc>) {
        if message_ids.is_empty() {
            return;
        }
        if self.participant_message_ids != message_ids || self.ready_at.is_none() {
            self.ready_at = Some(at);
        }
        self.participant_message_ids = message_ids;
    }

    pub fn start_streaming(&mut self, at: DateTime<Utc>) {
        self.status = RecordStatus::Streaming;
        self.streaming_started_at = Some(at);
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = RecordStatus::Complete;
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = RecordStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(at);
    }

    /// Back to a ready-but-pending record after an interrupted stream
    pub fn reset(&mut self) {
        self.status = RecordStatus::Pending;
        self.streaming_started_at = None;
        self.completed_at = None;
        self.error_message = None;
    }
}

/// One entry of a change record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigChange {
    ParticipantAdded {
        participant_id: String,
        model_id: String,
    },
    ParticipantRemoved {
        participant_id: String,
        model_id: String,
    },
    ParticipantReordered {
        participant_id: String,
        from: usize,
        to: usize,
    },
    ParticipantRoleChanged {
        participant_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    ModeChanged {
        from: ChatMode,
        to: ChatMode,
    },
    WebSearchToggled {
        enabled: bool,
    },
}

/// Configuration a round runs with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RoundConfig {
    pub participants: Vec<Participant>,
    pub mode: ChatMode,
    pub enable_web_search: bool,
}

impl RoundConfig {
    pub fn new(participants: Vec<Participant>, mode: ChatMode, enable_web_search: bool) -> Self {
        Self {
            participants,
            mode,
            enable_web_search,
        }
    }

    /// Structured diff from `self` to `next`.
    ///
    /// Only enabled participants count; disabling one reads as a removal.
    pub fn diff(&self, next: &RoundConfig) -> Vec<ConfigChange> {
        let before = crate::thread::roster(&self.participants);
        let after = crate::thread::roster(&next.participants);
        let mut changes = Vec::new();

        for p in &after {
            if !before.iter().any(|b| b.id == p.id) {
                changes.push(ConfigChange::ParticipantAdded {
                    participant_id: p.id.clone(),
                    model_id: p.model_id.clone(),
                });
            }
        }
        for p in &before {
            if !after.iter().any(|a| a.id == p.id) {
                changes.push(ConfigChange::ParticipantRemoved {
                    participant_id: p.id.clone(),
                    model_id: p.model_id.clone(),
                });
            }
        }

        // Reorders are judged among the participants present on both sides
        let kept_before: Vec<&Participant> = before
            .iter()
            .filter(|b| after.iter().any(|a| a.id == b.id))
            .collect();
        let kept_after: Vec<&Participant> = after
            .iter()
            .filter(|a| before.iter().any(|b| b.id == a.id))
            .collect();
        for (to, p) in kept_after.iter().enumerate() {
            if let Some(from) = kept_before.iter().position(|b| b.id == p.id) {
                if from != to {
                    changes.push(ConfigChange::ParticipantReordered {
                        participant_id: p.id.clone(),
                        from,
                        to,
                    });
                }
            }
            if let Some(old) = kept_before.iter().find(|b| b.id == p.id) {
                if old.role != p.role {
                    changes.push(ConfigChange::ParticipantRoleChanged {
                        participant_id: p.id.clone(),
                        from: old.role.clone(),
                        to: p.role.clone(),
                    });
                }
            }
        }

        if self.mode != next.mode {
            changes.push(ConfigChange::ModeChanged {
                from: self.mode,
                to: next.mode,
            });
        }
        if self.enable_web_search != next.enable_web_search {
            changes.push(ConfigChange::WebSearchToggled {
                enabled: next.enable_web_search,
            });
        }

        changes
    }
}

/// Persisted diff describing what changed entering a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeRecord {
    pub id: String,
    pub thread_id: String,
    pub round_number: u32,
    pub previous_round_number: Option<u32>,
    pub changes: Vec<ConfigChange>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ids: &[&str], mode: ChatMode, search: bool) -> RoundConfig {
        let participants = ids
            .iter()
            .enumerate()
            .map(|(i, id)| Participant::new(*id, format!("model-{}", id), i as u32))
            .collect();
        RoundConfig::new(participants, mode, search)
    }

    #[test]
    fn test_diff_detects_added_and_removed() {
        let before = config(&["a", "b"], ChatMode::Analyzing, false);
        let after = config(&["a", "c"], ChatMode::Analyzing, false);

        let changes = before.diff(&after);
        assert!(changes.contains(&ConfigChange::ParticipantAdded {
            participant_id: "c".to_string(),
            model_id: "model-c".to_string(),
        }));
        assert!(changes.contains(&ConfigChange::ParticipantRemoved {
            participant_id: "b".to_string(),
            model_id: "model-b".to_string(),
        }));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_diff_detects_reorder_mode_and_search() {
        let before = config(&["a", "b"], ChatMode::Analyzing, false);
        let after = config(&["b", "a"], ChatMode::Debating, true);

        let changes = before.diff(&after);
        assert!(changes.contains(&ConfigChange::ParticipantReordered {
            participant_id: "b".to_string(),
            from: 1,
            to: 0,
        }));
        assert!(changes.contains(&ConfigChange::ModeChanged {
            from: ChatMode::Analyzing,
            to: ChatMode::Debating,
        }));
        assert!(changes.contains(&ConfigChange::WebSearchToggled { enabled: true }));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let cfg = config(&["a", "b"], ChatMode::Solving, true);
        assert!(cfg.diff(&cfg.clone()).is_empty());
    }

    #[test]
    fn test_synthesis_placeholder_and_populate() {
        let now = Utc::now();
        let mut record = SynthesisRecord::placeholder("s1", "t1", 0, now);
        assert!(record.is_placeholder());
        assert!(!record.is_ready());

        record.populate(Vec::new(), now);
        assert!(record.is_placeholder());

        record.populate(vec!["m1".to_string(), "m2".to_string()], now);
        assert!(record.is_ready());
        assert!(!record.is_placeholder());
        assert_eq!(record.ready_at, Some(now));
    }
}
