use std::sync::Arc;

use anyhow::{anyhow, Result};

use roundtable_llm::{ModeratorClient, ParticipantClient};
use roundtable_persist::{ChangeRecordService, ResearchService, StreamStatusStore, ThreadService};
use roundtable_types::EngineConfig;

use crate::orchestrator::{Collaborators, Orchestrator};

/// Builder for wiring an [`Orchestrator`] to its collaborators
pub struct OrchestratorBuilder {
    threads: Option<Arc<dyn ThreadService>>,
    change_records: Option<Arc<dyn ChangeRecordService>>,
    research: Option<Arc<dyn ResearchService>>,
    participants: Option<Arc<dyn ParticipantClient>>,
    moderator: Option<Arc<dyn ModeratorClient>>,
    stream_status: Option<Arc<dyn StreamStatusStore>>,
    config: EngineConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            threads: None,
            change_records: None,
            research: None,
            participants: None,
            moderator: None,
            stream_status: None,
            config: EngineConfig::default(),
        }
    }

    pub fn thread_service(mut self, service: Arc<dyn ThreadService>) -> Self {
        self.threads = Some(service);
        self
    }

    pub fn change_records(mut self, service: Arc<dyn ChangeRecordService>) -> Self {
        self.change_records = Some(service);
        self
    }

    pub fn research_service(mut self, service: Arc<dyn ResearchService>) -> Self {
        self.research = Some(service);
        self
    }

    pub fn participant_client(mut self, client: Arc<dyn ParticipantClient>) -> Self {
        self.participants = Some(client);
        self
    }

    pub fn moderator_client(mut self, client: Arc<dyn ModeratorClient>) -> Self {
        self.moderator = Some(client);
        self
    }

    pub fn stream_status_store(mut self, store: Arc<dyn StreamStatusStore>) -> Self {
        self.stream_status = Some(store);
        self
    }

    /// Use one backend for every persistence concern
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: ThreadService + ChangeRecordService + ResearchService + StreamStatusStore + 'static,
    {
        self.thread_service(backend.clone())
            .change_records(backend.clone())
            .research_service(backend.clone())
            .stream_status_store(backend)
    }

    /// Use one client for participants and the moderator
    pub fn round_client<C>(self, client: Arc<C>) -> Self
    where
        C: ParticipantClient + ModeratorClient + 'static,
    {
        self.participant_client(client.clone()).moderator_client(client)
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        if self.config.channel_capacity == 0 {
            return Err(anyhow!("Channel capacity must be greater than zero"));
        }
        if self.config.tick_interval.is_zero() {
            return Err(anyhow!("Tick interval must be greater than zero"));
        }

        let collaborators = Collaborators {
            threads: self
                .threads
                .ok_or_else(|| anyhow!("Thread service is required"))?,
            change_records: self
                .change_records
                .ok_or_else(|| anyhow!("Change record service is required"))?,
            research: self
                .research
                .ok_or_else(|| anyhow!("Research service is required"))?,
            participants: self
                .participants
                .ok_or_else(|| anyhow!("Participant client is required"))?,
            moderator: self
                .moderator
                .ok_or_else(|| anyhow!("Moderator client is required"))?,
            stream_status: self
                .stream_status
                .ok_or_else(|| anyhow!("Stream status store is required"))?,
        };

        Ok(Orchestrator::new(collaborators, self.config))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
