use std::collections::{BTreeMap, HashMap};

use roundtable_types::{
    ChangeRecord, Message, ResearchRecord, RoundConfig, StreamKey, StreamStatus, SynthesisRecord,
    Thread, ThreadSnapshot,
};

/// Everything the in-memory backend keeps for one thread
#[derive(Debug, Clone)]
pub(crate) struct StoredThread {
    pub thread: Thread,
    pub config: RoundConfig,
    pub messages: Vec<Message>,
    pub research: BTreeMap<u32, ResearchRecord>,
    pub syntheses: BTreeMap<u32, SynthesisRecord>,
    pub change_records: BTreeMap<u32, ChangeRecord>,
}

impl StoredThread {
    pub fn new(thread: Thread, config: RoundConfig) -> Self {
        Self {
            thread,
            config,
            messages: Vec::new(),
            research: BTreeMap::new(),
            syntheses: BTreeMap::new(),
            change_records: BTreeMap::new(),
        }
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            thread: self.thread.clone(),
            participants: self.config.participants.clone(),
            messages: self.messages.clone(),
            research: self.research.values().cloned().collect(),
            syntheses: self.syntheses.values().cloned().collect(),
            change_records: self.change_records.values().cloned().collect(),
        }
    }

    pub fn upsert_message(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_user())
    }

    pub fn latest_round_number(&self) -> Option<u32> {
        self.messages.iter().map(|m| m.round_number).max()
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub threads: HashMap<String, StoredThread>,
    pub stream_statuses: HashMap<StreamKey, StreamStatus>,
}

/// Lowercase words of `text` joined by dashes, at most `max_words` of them
pub(crate) fn slugify(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(max_words)
        .collect::<Vec<_>>()
        .join("-")
}

/// Title derived from the opening words of the first message
pub(crate) fn title_from(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(6).collect();
    if words.is_empty() {
        return "New conversation".to_string();
    }
    let mut title = words.join(" ");
    if let Some(first) = title.get(0..1) {
        title = first.to_uppercase() + &title[1..];
    }
    title
}
