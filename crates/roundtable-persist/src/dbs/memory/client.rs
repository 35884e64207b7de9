use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use roundtable_types::{
    ChangeRecord, Message, RecordStatus, ResearchRecord, ResearchResult, StreamKey, StreamStatus,
    StreamStatusEntry, SynthesisRecord, Thread, ThreadSnapshot,
};

use crate::dbs::memory::store::{slugify, title_from, MemoryStore, StoredThread};
use crate::error::{PersistError, Result};
use crate::models::{ConfigUpdate, CreateThreadRequest};
use crate::trait_client::{ChangeRecordService, ResearchService, StreamStatusStore, ThreadService};

/// Scripted result of a research execution
#[derive(Debug, Clone)]
pub enum ResearchOutcome {
    Succeed(ResearchResult),
    Fail(String),
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryBackendConfig {
    pub research_delay: Duration,
    pub title_delay: Duration,
    pub observe_poll_interval: Duration,
    pub observe_timeout: Duration,
    pub research_outcomes: HashMap<u32, ResearchOutcome>,
    pub fail_config_updates: bool,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            research_delay: Duration::ZERO,
            title_delay: Duration::ZERO,
            observe_poll_interval: Duration::from_millis(20),
            observe_timeout: Duration::from_secs(30),
            research_outcomes: HashMap::new(),
            fail_config_updates: false,
        }
    }
}

/// In-process implementation of every persistence collaborator.
///
/// Cloning shares the underlying store, so one backend can be handed to the
/// orchestrator and inspected by the caller.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<MemoryStore>>,
    config: Arc<MemoryBackendConfig>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    pub(crate) fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::default())),
            config: Arc::new(config),
        }
    }

    pub fn builder() -> crate::builder::MemoryBackendBuilder {
        crate::builder::MemoryBackendBuilder::new()
    }

    /// Seed a thread as if it had been persisted earlier
    pub async fn insert_snapshot(&self, snapshot: ThreadSnapshot) {
        let config = roundtable_types::RoundConfig::new(
            snapshot.participants.clone(),
            snapshot.thread.mode,
            snapshot.thread.enable_web_search,
        );
        let mut stored = StoredThread::new(snapshot.thread.clone(), config);
        stored.messages = snapshot.messages;
        for record in snapshot.research {
            stored.research.insert(record.round_number, record);
        }
        for record in snapshot.syntheses {
            stored.syntheses.insert(record.round_number, record);
        }
        for record in snapshot.change_records {
            stored.change_records.insert(record.round_number, record);
        }

        let mut store = self.store.write().await;
        store.threads.insert(snapshot.thread.id.clone(), stored);
    }

    /// Ids of all stored threads
    pub async fn thread_ids(&self) -> Vec<String> {
        let store = self.store.read().await;
        store.threads.keys().cloned().collect()
    }

    fn default_result(query: &str) -> ResearchResult {
        ResearchResult {
            queries: vec![query.to_string()],
            summary: format!("Findings for: {}", query),
            sources: Vec::new(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadService for MemoryBackend {
    async fn create_thread(&self, request: CreateThreadRequest) -> Result<ThreadSnapshot> {
        if request.first_message.trim().is_empty() {
            return Err(PersistError::InvalidRequest(
                "first message must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let mut slug = slugify(&request.first_message, 5);
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&id[..8]);

        let thread = Thread::new(id.clone(), slug, now)
            .with_mode(request.mode)
            .with_web_search(request.enable_web_search);

        let mut stored = StoredThread::new(thread, request.config());
        stored.messages.push(Message::user(
            request.message_id.clone(),
            id.clone(),
            0,
            request.first_message.clone(),
            now,
        ));
        if request.enable_web_search {
            stored.research.insert(
                0,
                ResearchRecord::pending(
                    uuid::Uuid::new_v4().to_string(),
                    id.clone(),
                    0,
                    request.first_message.clone(),
                    now,
                ),
            );
        }

        let snapshot = stored.snapshot();
        let mut store = self.store.write().await;
        store.threads.insert(id.clone(), stored);
        tracing::info!(thread_id = %id, "Created thread");

        Ok(snapshot)
    }

    async fn update_configuration(&self, thread_id: &str, update: ConfigUpdate) -> Result<Thread> {
        if self.config.fail_config_updates {
            return Err(PersistError::Connection(
                "configuration update rejected".to_string(),
            ));
        }

        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;

        let changes = stored.config.diff(&update.config);
        let now = Utc::now();

        stored.thread.mode = update.config.mode;
        stored.thread.enable_web_search = update.config.enable_web_search;
        stored.thread.updated_at = now;
        stored.config = update.config;

        // One change record per round; a repeated update keeps the first
        if !changes.is_empty() && !stored.change_records.contains_key(&update.round_number) {
            let previous_round_number = update.round_number.checked_sub(1);
            stored.change_records.insert(
                update.round_number,
                ChangeRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    thread_id: thread_id.to_string(),
                    round_number: update.round_number,
                    previous_round_number,
                    changes,
                    created_at: now,
                },
            );
        }

        Ok(stored.thread.clone())
    }

    async fn load_thread(&self, thread_id: &str) -> Result<ThreadSnapshot> {
        let store = self.store.read().await;
        store
            .threads
            .get(thread_id)
            .map(StoredThread::snapshot)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    async fn await_title(&self, thread_id: &str) -> Result<Thread> {
        if !self.config.title_delay.is_zero() {
            tokio::time::sleep(self.config.title_delay).await;
        }

        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;

        if !stored.thread.is_ai_generated_title {
            let title = stored
                .first_user_message()
                .map(|m| title_from(&m.content))
                .unwrap_or_else(|| title_from(""));
            stored.thread.title = Some(title);
            stored.thread.is_ai_generated_title = true;
            stored.thread.updated_at = Utc::now();
        }

        Ok(stored.thread.clone())
    }

    async fn save_message(&self, message: Message) -> Result<()> {
        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(&message.thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(message.thread_id.clone()))?;
        stored.upsert_message(message);
        Ok(())
    }

    async fn save_synthesis(&self, record: SynthesisRecord) -> Result<()> {
        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(&record.thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(record.thread_id.clone()))?;
        stored.syntheses.insert(record.round_number, record);
        Ok(())
    }

    async fn discard_round(&self, thread_id: &str, round_number: u32) -> Result<()> {
        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;

        if stored.latest_round_number() != Some(round_number) {
            return Err(PersistError::InvalidRequest(format!(
                "only the latest round can be regenerated, got {}",
                round_number
            )));
        }

        stored
            .messages
            .retain(|m| m.round_number != round_number || m.is_user());
        stored.syntheses.remove(&round_number);
        stored.research.remove(&round_number);
        store
            .stream_statuses
            .retain(|key, _| !(key.thread_id == thread_id && key.round_number == round_number));

        Ok(())
    }
}

#[async_trait]
impl ChangeRecordService for MemoryBackend {
    async fn fetch_change_record(
        &self,
        thread_id: &str,
        round_number: u32,
    ) -> Result<Option<ChangeRecord>> {
        let store = self.store.read().await;
        let stored = store
            .threads
            .get(thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;
        Ok(stored.change_records.get(&round_number).cloned())
    }
}

#[async_trait]
impl ResearchService for MemoryBackend {
    async fn execute(
        &self,
        thread_id: &str,
        round_number: u32,
        query: &str,
    ) -> Result<ResearchResult> {
        {
            let mut store = self.store.write().await;
            let stored = store
                .threads
                .get_mut(thread_id)
                .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;
            let record = stored.research.entry(round_number).or_insert_with(|| {
                ResearchRecord::pending(
                    uuid::Uuid::new_v4().to_string(),
                    thread_id.to_string(),
                    round_number,
                    query.to_string(),
                    Utc::now(),
                )
            });
            record.status = RecordStatus::Streaming;
        }

        if !self.config.research_delay.is_zero() {
            tokio::time::sleep(self.config.research_delay).await;
        }

        let outcome = self
            .config
            .research_outcomes
            .get(&round_number)
            .cloned()
            .unwrap_or_else(|| ResearchOutcome::Succeed(Self::default_result(query)));

        let mut store = self.store.write().await;
        let stored = store
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;
        let record = stored.research.get_mut(&round_number).ok_or_else(|| {
            PersistError::ResearchNotFound {
                thread_id: thread_id.to_string(),
                round_number,
            }
        })?;

        match outcome {
            ResearchOutcome::Succeed(result) => {
                record.complete(result.clone(), Utc::now());
                Ok(result)
            }
            ResearchOutcome::Fail(error) => {
                record.fail(error.clone(), Utc::now());
                Err(PersistError::ResearchFailed(error))
            }
        }
    }

    async fn observe(&self, thread_id: &str, round_number: u32) -> Result<ResearchRecord> {
        let deadline = tokio::time::Instant::now() + self.config.observe_timeout;

        loop {
            {
                let store = self.store.read().await;
                let stored = store
                    .threads
                    .get(thread_id)
                    .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;
                let record = stored.research.get(&round_number).ok_or_else(|| {
                    PersistError::ResearchNotFound {
                        thread_id: thread_id.to_string(),
                        round_number,
                    }
                })?;
                if record.status.is_terminal() {
                    return Ok(record.clone());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(PersistError::Internal(format!(
                    "research for round {} did not settle",
                    round_number
                )));
            }
            tokio::time::sleep(self.config.observe_poll_interval).await;
        }
    }
}

#[async_trait]
impl StreamStatusStore for MemoryBackend {
    async fn set_status(&self, key: StreamKey, status: StreamStatus) -> Result<()> {
        let mut store = self.store.write().await;
        store.stream_statuses.insert(key, status);
        Ok(())
    }

    async fn get_status(&self, key: &StreamKey) -> Result<StreamStatus> {
        let store = self.store.read().await;
        Ok(store.stream_statuses.get(key).copied().unwrap_or_default())
    }

    async fn list_round(&self, thread_id: &str, round_number: u32) -> Result<Vec<StreamStatusEntry>> {
        let store = self.store.read().await;
        let mut entries: Vec<StreamStatusEntry> = store
            .stream_statuses
            .iter()
            .filter(|(key, _)| key.thread_id == thread_id && key.round_number == round_number)
            .map(|(key, status)| StreamStatusEntry::new(key.clone(), *status))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
