use anyhow::Result;
use async_trait::async_trait;
use roundtable_types::{ChatMode, Message, Participant, ResearchResult};

use crate::streaming::ChunkStream;

/// Streams one participant's answer for a round
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    async fn stream_participant(&self, request: ParticipantRequest) -> Result<ChunkStream>;
}

/// Streams the moderator's synthesis of a finished round
#[async_trait]
pub trait ModeratorClient: Send + Sync {
    async fn stream_synthesis(&self, request: SynthesisRequest) -> Result<ChunkStream>;
}

/// Convenience trait for providers that serve both roles
pub trait RoundClient: ParticipantClient + ModeratorClient {}

impl<T: ParticipantClient + ModeratorClient> RoundClient for T {}

#[derive(Debug, Clone)]
pub struct ParticipantRequest {
    pub thread_id: String,
    pub round_number: u32,
    pub participant_index: usize,
    pub participant: Participant,
    pub mode: ChatMode,
    /// Prior messages of the thread, oldest first, including the round's user
    /// message and earlier participants of the same round
    pub history: Vec<Message>,
    pub research: Option<ResearchResult>,
}

impl ParticipantRequest {
    pub fn new(
        thread_id: impl Into<String>,
        round_number: u32,
        participant_index: usize,
        participant: Participant,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            round_number,
            participant_index,
            participant,
            mode: ChatMode::default(),
            history: Vec::new(),
            research: None,
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_research(mut self, research: Option<ResearchResult>) -> Self {
        self.research = research;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub thread_id: String,
    pub round_number: u32,
    pub mode: ChatMode,
    pub user_query: String,
    pub participant_messages: Vec<Message>,
}

impl SynthesisRequest {
    pub fn new(thread_id: impl Into<String>, round_number: u32, user_query: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            round_number,
            mode: ChatMode::default(),
            user_query: user_query.into(),
            participant_messages: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_participant_messages(mut self, messages: Vec<Message>) -> Self {
        self.participant_messages = messages;
        self
    }
}
