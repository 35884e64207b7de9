use async_trait::async_trait;

use roundtable_types::{
    ChangeRecord, Message, ResearchRecord, ResearchResult, StreamKey, StreamStatus,
    StreamStatusEntry, SynthesisRecord, Thread, ThreadSnapshot,
};

use crate::error::Result;
use crate::models::{ConfigUpdate, CreateThreadRequest};

/// Thread creation, configuration and message storage
#[async_trait]
pub trait ThreadService: Send + Sync {
    /// Create a thread from its first message.
    ///
    /// The snapshot holds the stored user message and, when web search is
    /// enabled, the pending research record of round 0.
    async fn create_thread(&self, request: CreateThreadRequest) -> Result<ThreadSnapshot>;

    /// Persist the configuration a later round starts with
    async fn update_configuration(&self, thread_id: &str, update: ConfigUpdate) -> Result<Thread>;

    /// Load everything persisted for a thread
    async fn load_thread(&self, thread_id: &str) -> Result<ThreadSnapshot>;

    /// Resolve once the thread has an AI-generated title
    async fn await_title(&self, thread_id: &str) -> Result<Thread>;

    /// Upsert a message by id
    async fn save_message(&self, message: Message) -> Result<()>;

    /// Upsert the synthesis record of a round
    async fn save_synthesis(&self, record: SynthesisRecord) -> Result<()>;

    /// Drop a round's assistant messages and synthesis before regeneration
    async fn discard_round(&self, thread_id: &str, round_number: u32) -> Result<()>;
}

/// Change records produced by configuration updates
#[async_trait]
pub trait ChangeRecordService: Send + Sync {
    async fn fetch_change_record(
        &self,
        thread_id: &str,
        round_number: u32,
    ) -> Result<Option<ChangeRecord>>;
}

/// Research executions keyed by thread and round
#[async_trait]
pub trait ResearchService: Send + Sync {
    /// Run research for a round and wait for its result
    async fn execute(
        &self,
        thread_id: &str,
        round_number: u32,
        query: &str,
    ) -> Result<ResearchResult>;

    /// Wait for an execution started elsewhere to settle, without re-running it
    async fn observe(&self, thread_id: &str, round_number: u32) -> Result<ResearchRecord>;
}

/// Durable key/value store of stream statuses
#[async_trait]
pub trait StreamStatusStore: Send + Sync {
    async fn set_status(&self, key: StreamKey, status: StreamStatus) -> Result<()>;

    /// `NotStarted` for unknown keys
    async fn get_status(&self, key: &StreamKey) -> Result<StreamStatus>;

    async fn list_round(&self, thread_id: &str, round_number: u32) -> Result<Vec<StreamStatusEntry>>;
}
