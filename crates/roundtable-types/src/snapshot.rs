use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::records::{ChangeRecord, ResearchRecord, SynthesisRecord};
use crate::stream::{StreamKey, StreamStatus};
use crate::thread::{Participant, Thread};

/// Everything persisted for a thread, as loaded on (re)attachment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadSnapshot {
    pub thread: Thread,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub research: Vec<ResearchRecord>,
    #[serde(default)]
    pub syntheses: Vec<SynthesisRecord>,
    #[serde(default)]
    pub change_records: Vec<ChangeRecord>,
}

impl ThreadSnapshot {
    pub fn new(thread: Thread, participants: Vec<Participant>) -> Self {
        Self {
            thread,
            participants,
            messages: Vec::new(),
            research: Vec::new(),
            syntheses: Vec::new(),
            change_records: Vec::new(),
        }
    }

    pub fn latest_round_number(&self) -> Option<u32> {
        self.messages.iter().map(|m| m.round_number).max()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamStatusEntry {
    pub key: StreamKey,
    pub status: StreamStatus,
}

impl StreamStatusEntry {
    pub fn new(key: StreamKey, status: StreamStatus) -> Self {
        Self { key, status }
    }
}
