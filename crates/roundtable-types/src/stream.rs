use serde::{Deserialize, Serialize};

/// What a tracked stream produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamTarget {
    Research,
    Participant { index: usize },
    Synthesis,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub thread_id: String,
    pub round_number: u32,
    pub target: StreamTarget,
}

impl StreamKey {
    pub fn new(thread_id: impl Into<String>, round_number: u32, target: StreamTarget) -> Self {
        Self {
            thread_id: thread_id.into(),
            round_number,
            target,
        }
    }

    pub fn participant(thread_id: impl Into<String>, round_number: u32, index: usize) -> Self {
        Self::new(thread_id, round_number, StreamTarget::Participant { index })
    }
}

/// Durable status of a stream, as seen by whoever attaches next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Still producing output somewhere else
    Active,
    /// Finished, possibly while nobody was attached
    Completed,
    Failed,
    NotStarted,
}

impl Default for StreamStatus {
    fn default() -> Self {
        StreamStatus::NotStarted
    }
}
