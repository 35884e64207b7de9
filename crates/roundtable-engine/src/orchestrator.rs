use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use roundtable_llm::{
    ChunkStream, ModeratorClient, ParticipantClient, StreamAccumulator, StreamError, StreamOutcome,
};
use roundtable_persist::{
    ChangeRecordService, ConfigUpdate, PersistError, ResearchService, StreamStatusStore,
    ThreadService,
};
use roundtable_types::{
    Command, EngineConfig, FinishReason, RecordStatus, RoundEvent, StreamKey, StreamStatus, StreamTarget,
};

use crate::error::{EngineError, Result};
use crate::reducer::{Effect, Reducer};
use crate::state::RoundState;
use crate::timeline::{self, TimelineItem};

/// Everything the engine talks to outside of its own state
#[derive(Clone)]
pub struct Collaborators {
    pub threads: Arc<dyn ThreadService>,
    pub change_records: Arc<dyn ChangeRecordService>,
    pub research: Arc<dyn ResearchService>,
    pub participants: Arc<dyn ParticipantClient>,
    pub moderator: Arc<dyn ModeratorClient>,
    pub stream_status: Arc<dyn StreamStatusStore>,
}

pub struct Orchestrator {
    collaborators: Collaborators,
    config: EngineConfig,
}

impl Orchestrator {
    pub(crate) fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Create a builder for fluent construction
    pub fn builder() -> crate::builder::OrchestratorBuilder {
        crate::builder::OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the event loop on a fresh container
    pub fn spawn(&self) -> OrchestratorHandle {
        self.spawn_with_state(RoundState::new())
    }

    /// Spawn the event loop, return the handle that feeds it
    pub fn spawn_with_state(&self, state: RoundState) -> OrchestratorHandle {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        let (writer_tx, writer_rx) = mpsc::channel(self.config.channel_capacity);
        let (state_tx, state_rx) = watch::channel(state.clone());
        let shutdown = Arc::new(Notify::new());

        let runtime = Runtime {
            reducer: Reducer::new(self.config.policy.clone()),
            collaborators: self.collaborators.clone(),
            config: self.config.clone(),
            events: event_tx.downgrade(),
            writer: writer_tx,
        };

        tokio::spawn(write_loop(self.collaborators.threads.clone(), writer_rx));
        tokio::spawn(runtime.run(state, event_rx, state_tx, shutdown.clone()));

        OrchestratorHandle {
            events: event_tx,
            state: state_rx,
            threads: self.collaborators.threads.clone(),
            stream_status: self.collaborators.stream_status.clone(),
            shutdown,
        }
    }
}

/// Cloneable front door to a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    events: mpsc::Sender<RoundEvent>,
    state: watch::Receiver<RoundState>,
    threads: Arc<dyn ThreadService>,
    stream_status: Arc<dyn StreamStatusStore>,
    shutdown: Arc<Notify>,
}

impl OrchestratorHandle {
    /// Turn a UI command into a timestamped event with fresh ids
    pub async fn dispatch(&self, command: Command) -> Result<()> {
        let at = Utc::now();
        let event = match command {
            Command::SubmitMessage { content } => {
                if content.trim().is_empty() {
                    return Err(EngineError::Rejected("message content is empty".to_string()));
                }
                submission(content)
            }
            Command::ToggleWebSearch { enabled } => RoundEvent::WebSearchToggled { enabled },
            Command::UpdateParticipants { participants } => {
                RoundEvent::ParticipantsUpdated { participants }
            }
            Command::SetMode { mode } => RoundEvent::ModeChanged { mode },
            Command::RetryRound { round_number } => RoundEvent::RoundRetryRequested {
                round_number,
                research_id: new_id(),
                synthesis_id: new_id(),
                at,
            },
            Command::SetOnline { online } => RoundEvent::ConnectivityChanged { online, at },
            Command::Attach { thread_id } => {
                load_attachment(self.threads.as_ref(), self.stream_status.as_ref(), &thread_id).await?
            }
        };
        self.send_event(event).await
    }

    /// Feed a raw event, bypassing command translation
    pub async fn send_event(&self, event: RoundEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| EngineError::Closed)
    }

    /// Latest published container
    pub fn snapshot(&self) -> RoundState {
        self.state.borrow().clone()
    }

    pub fn timeline(&self) -> Vec<TimelineItem> {
        timeline::assemble(&self.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<RoundState> {
        self.state.clone()
    }

    /// Wait until the published container satisfies `predicate`
    pub async fn wait_until<F>(&self, predicate: F, timeout: Duration) -> Result<RoundState>
    where
        F: Fn(&RoundState) -> bool,
    {
        let mut receiver = self.state.clone();
        let waited = tokio::time::timeout(timeout, async {
            receiver
                .wait_for(|state| predicate(state))
                .await
                .map(|state| (*state).clone())
        })
        .await;

        match waited {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) => Err(EngineError::Closed),
            Err(_) => Err(EngineError::Timeout(timeout, "state condition")),
        }
    }

    /// Stop the event loop and wait for it to wind down
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        self.events.closed().await;
    }
}

struct Runtime {
    reducer: Reducer,
    collaborators: Collaborators,
    config: EngineConfig,
    events: mpsc::WeakSender<RoundEvent>,
    writer: mpsc::Sender<Effect>,
}

impl Runtime {
    async fn run(
        self,
        mut state: RoundState,
        mut event_rx: mpsc::Receiver<RoundEvent>,
        state_tx: watch::Sender<RoundState>,
        shutdown: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Orchestrator started");

        loop {
            let event = tokio::select! {
                _ = shutdown.notified() => break,
                received = event_rx.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
                _ = ticker.tick() => RoundEvent::Tick { at: Utc::now() },
            };

            let kind = event.kind();
            let effects = self.reducer.reduce(&mut state, event);
            if kind != "tick" {
                trace!(event = kind, effects = effects.len(), "Event reduced");
            }
            state_tx.send_replace(state.clone());

            for effect in effects {
                self.execute(effect).await;
            }
        }

        info!("Orchestrator stopped");
    }

    async fn execute(&self, effect: Effect) {
        debug!(effect = effect.kind(), "Executing effect");
        match effect {
            Effect::PersistMessage { .. } | Effect::PersistSynthesis { .. } => {
                if self.writer.send(effect).await.is_err() {
                    error!("Persistence writer stopped; dropping write");
                }
            }
            Effect::Navigate {
                thread_id,
                slug,
                reason,
            } => {
                debug!(%thread_id, %slug, ?reason, "Navigation published with state");
            }
            effect => {
                let Some(events) = self.events.upgrade() else {
                    return;
                };
                let worker = EffectWorker {
                    collaborators: self.collaborators.clone(),
                    config: self.config.clone(),
                    events,
                };
                tokio::spawn(async move {
                    let kind = effect.kind();
                    if let Err(e) = worker.run(effect).await {
                        error!(effect = kind, error = %e, "Effect failed");
                    }
                });
            }
        }
    }
}

/// Applies message and synthesis writes in the order they were reduced
async fn write_loop(threads: Arc<dyn ThreadService>, mut writes: mpsc::Receiver<Effect>) {
    while let Some(effect) = writes.recv().await {
        let written = match effect {
            Effect::PersistMessage { message } => {
                let id = message.id.clone();
                threads
                    .save_message(message)
                    .await
                    .map_err(|e| (format!("message {}", id), e))
            }
            Effect::PersistSynthesis { record } => {
                let round_number = record.round_number;
                threads
                    .save_synthesis(record)
                    .await
                    .map_err(|e| (format!("synthesis of round {}", round_number), e))
            }
            _ => Ok(()),
        };
        if let Err((what, e)) = written {
            error!(error = %e, "Failed to persist {}", what);
        }
    }
}

struct EffectWorker {
    collaborators: Collaborators,
    config: EngineConfig,
    events: mpsc::Sender<RoundEvent>,
}

impl EffectWorker {
    async fn emit(&self, event: RoundEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| EngineError::Closed)
    }

    async fn run(&self, effect: Effect) -> Result<()> {
        let threads = &self.collaborators.threads;

        match effect {
            Effect::CreateThread { request } => {
                let event = match threads.create_thread(request).await {
                    Ok(snapshot) => RoundEvent::ThreadCreated {
                        thread: snapshot.thread,
                        participants: snapshot.participants,
                        at: Utc::now(),
                    },
                    Err(e) => RoundEvent::ThreadCreationFailed {
                        error: e.to_string(),
                        at: Utc::now(),
                    },
                };
                self.emit(event).await
            }

            Effect::AwaitTitle { thread_id } => match threads.await_title(&thread_id).await {
                Ok(thread) => match thread.title {
                    Some(title) => {
                        self.emit(RoundEvent::TitleReady {
                            title,
                            at: Utc::now(),
                        })
                        .await
                    }
                    None => Ok(()),
                },
                Err(e) => {
                    warn!(%thread_id, error = %e, "Title never arrived");
                    Ok(())
                }
            },

            Effect::PersistConfiguration {
                thread_id,
                round_number,
                config,
            } => {
                let update = ConfigUpdate::new(round_number, config);
                let event = match threads.update_configuration(&thread_id, update).await {
                    Ok(thread) => RoundEvent::ConfigurationPersisted {
                        round_number,
                        thread,
                        at: Utc::now(),
                    },
                    Err(e) => RoundEvent::ConfigurationPersistFailed {
                        round_number,
                        error: e.to_string(),
                        at: Utc::now(),
                    },
                };
                self.emit(event).await
            }

            Effect::FetchChangeRecord {
                thread_id,
                round_number,
            } => {
                let fetched = self
                    .collaborators
                    .change_records
                    .fetch_change_record(&thread_id, round_number)
                    .await;
                let event = match fetched {
                    Ok(Some(record)) => RoundEvent::ChangeRecordFetched {
                        record,
                        at: Utc::now(),
                    },
                    Ok(None) => RoundEvent::ChangeRecordFetchFailed {
                        round_number,
                        error: PersistError::ChangeRecordNotFound {
                            thread_id,
                            round_number,
                        }
                        .to_string(),
                        at: Utc::now(),
                    },
                    Err(e) => RoundEvent::ChangeRecordFetchFailed {
                        round_number,
                        error: e.to_string(),
                        at: Utc::now(),
                    },
                };
                self.emit(event).await
            }

            Effect::StartResearch {
                thread_id,
                round_number,
                query,
            } => {
                let key = StreamKey::new(&thread_id, round_number, StreamTarget::Research);
                self.set_status(key.clone(), StreamStatus::Active).await;
                self.emit(RoundEvent::ResearchStarted {
                    round_number,
                    at: Utc::now(),
                })
                .await?;
                let executed = self
                    .collaborators
                    .research
                    .execute(&thread_id, round_number, &query)
                    .await;
                let event = match executed {
                    Ok(result) => {
                        self.set_status(key, StreamStatus::Completed).await;
                        RoundEvent::ResearchCompleted {
                            round_number,
                            result,
                            at: Utc::now(),
                        }
                    }
                    Err(e) => {
                        self.set_status(key, StreamStatus::Failed).await;
                        RoundEvent::ResearchFailed {
                            round_number,
                            error: e.to_string(),
                            at: Utc::now(),
                        }
                    }
                };
                self.emit(event).await
            }

            Effect::ObserveResearch {
                thread_id,
                round_number,
            } => {
                let observed = self
                    .collaborators
                    .research
                    .observe(&thread_id, round_number)
                    .await;
                let event = match observed {
                    Ok(record) => match (record.status, record.result) {
                        (RecordStatus::Complete, Some(result)) => RoundEvent::ResearchCompleted {
                            round_number,
                            result,
                            at: Utc::now(),
                        },
                        (status, _) => RoundEvent::ResearchFailed {
                            round_number,
                            error: record
                                .error_message
                                .unwrap_or_else(|| format!("research settled as {:?}", status)),
                            at: Utc::now(),
                        },
                    },
                    Err(e) => RoundEvent::ResearchFailed {
                        round_number,
                        error: e.to_string(),
                        at: Utc::now(),
                    },
                };
                self.emit(event).await
            }

            Effect::StreamParticipant {
                request,
                message_id,
            } => {
                let round_number = request.round_number;
                let participant_index = request.participant_index;
                let key = StreamKey::participant(&request.thread_id, round_number, participant_index);

                self.set_status(key.clone(), StreamStatus::Active).await;
                self.emit(RoundEvent::ParticipantStreamStarted {
                    round_number,
                    participant_index,
                    participant_id: request.participant.id.clone(),
                    message_id: message_id.unwrap_or_else(new_id),
                    at: Utc::now(),
                })
                .await?;

                let opened = self
                    .collaborators
                    .participants
                    .stream_participant(request)
                    .await
                    .map_err(|e| StreamError::Open(e.to_string()));
                let drained = match opened {
                    Ok(stream) => {
                        self.drain(stream, |content| RoundEvent::ParticipantChunk {
                            round_number,
                            participant_index,
                            content,
                        })
                        .await
                    }
                    Err(e) => Err(e),
                }
                .and_then(|outcome| {
                    if outcome.is_empty_response() {
                        Err(StreamError::EmptyResponse)
                    } else {
                        Ok(outcome)
                    }
                });

                match drained {
                    Ok(outcome) => {
                        debug!(
                            round_number,
                            participant_index,
                            duration_ms = outcome.duration_ms,
                            "Participant stream drained"
                        );
                        self.set_status(key, StreamStatus::Completed).await;
                        self.emit(RoundEvent::ParticipantCompleted {
                            round_number,
                            participant_index,
                            finish_reason: outcome.finish_reason,
                            at: Utc::now(),
                        })
                        .await
                    }
                    Err(e) => match e.finish_reason() {
                        FinishReason::Error => {
                            self.set_status(key, StreamStatus::Failed).await;
                            self.emit(RoundEvent::ParticipantFailed {
                                round_number,
                                participant_index,
                                error: e.to_string(),
                                at: Utc::now(),
                            })
                            .await
                        }
                        // Ended without output: terminal here, never retried
                        finish_reason => {
                            warn!(
                                round_number,
                                participant_index,
                                error = %e,
                                "Participant stream ended without output"
                            );
                            self.set_status(key, StreamStatus::Completed).await;
                            self.emit(RoundEvent::ParticipantCompleted {
                                round_number,
                                participant_index,
                                finish_reason,
                                at: Utc::now(),
                            })
                            .await
                        }
                    },
                }
            }

            Effect::StreamSynthesis {
                request,
                message_id,
            } => {
                let round_number = request.round_number;
                let key = StreamKey::new(&request.thread_id, round_number, StreamTarget::Synthesis);

                self.set_status(key.clone(), StreamStatus::Active).await;
                self.emit(RoundEvent::SynthesisStarted {
                    round_number,
                    message_id: message_id.unwrap_or_else(new_id),
                    at: Utc::now(),
                })
                .await?;

                let opened = self
                    .collaborators
                    .moderator
                    .stream_synthesis(request)
                    .await
                    .map_err(|e| StreamError::Open(e.to_string()));
                let drained = match opened {
                    Ok(stream) => {
                        self.drain(stream, |content| RoundEvent::SynthesisChunk {
                            round_number,
                            content,
                        })
                        .await
                    }
                    Err(e) => Err(e),
                }
                .and_then(|outcome| {
                    if outcome.is_empty_response() {
                        Err(StreamError::EmptyResponse)
                    } else {
                        Ok(outcome)
                    }
                });

                match drained {
                    Ok(_) => {
                        self.set_status(key, StreamStatus::Completed).await;
                        self.emit(RoundEvent::SynthesisCompleted {
                            round_number,
                            at: Utc::now(),
                        })
                        .await
                    }
                    Err(e) => {
                        self.set_status(key, StreamStatus::Failed).await;
                        self.emit(RoundEvent::SynthesisFailed {
                            round_number,
                            error: e.to_string(),
                            at: Utc::now(),
                        })
                        .await
                    }
                }
            }

            Effect::DiscardRound {
                thread_id,
                round_number,
            } => {
                let event = match threads.discard_round(&thread_id, round_number).await {
                    Ok(()) => RoundEvent::RoundDiscarded {
                        round_number,
                        at: Utc::now(),
                    },
                    Err(e) => RoundEvent::RoundDiscardFailed {
                        round_number,
                        error: e.to_string(),
                        at: Utc::now(),
                    },
                };
                self.emit(event).await
            }

            Effect::AwaitActiveStream { key } => {
                self.await_stream(&key).await?;
                self.reload(&key.thread_id).await
            }

            Effect::ReloadThread { thread_id } => self.reload(&thread_id).await,

            Effect::SubmitQueued { content } => self.emit(submission(content)).await,

            // Handled inline by the runtime
            Effect::PersistMessage { .. }
            | Effect::PersistSynthesis { .. }
            | Effect::Navigate { .. } => Ok(()),
        }
    }

    /// Forward chunks as events until the stream ends or reports done
    async fn drain<F>(&self, mut stream: ChunkStream, on_chunk: F) -> std::result::Result<StreamOutcome, StreamError>
    where
        F: Fn(String) -> RoundEvent,
    {
        let mut accumulator = StreamAccumulator::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(content) = accumulator.push(chunk) {
                        if self.emit(on_chunk(content)).await.is_err() {
                            return Err(accumulator.interrupted("orchestrator stopped"));
                        }
                    }
                }
                Err(e) => return Err(accumulator.interrupted(e.to_string())),
            }
            if accumulator.is_done() {
                break;
            }
        }
        Ok(accumulator.finish())
    }

    /// Poll until the stream leaves `Active`, giving up after the policy wait
    async fn await_stream(&self, key: &StreamKey) -> Result<()> {
        let store = &self.collaborators.stream_status;
        let deadline = tokio::time::Instant::now() + self.config.policy.active_stream_wait;

        loop {
            let status = store.get_status(key).await?;
            if status != StreamStatus::Active {
                debug!(?key, ?status, "Remote stream settled");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(?key, "Remote stream still active after wait; marking it failed");
                store.set_status(key.clone(), StreamStatus::Failed).await?;
                return Ok(());
            }
            tokio::time::sleep(self.config.stream_poll_interval).await;
        }
    }

    async fn reload(&self, thread_id: &str) -> Result<()> {
        let event = load_attachment(
            self.collaborators.threads.as_ref(),
            self.collaborators.stream_status.as_ref(),
            thread_id,
        )
        .await?;
        self.emit(event).await
    }

    async fn set_status(&self, key: StreamKey, status: StreamStatus) {
        if let Err(e) = self.collaborators.stream_status.set_status(key, status).await {
            warn!(error = %e, ?status, "Failed to record stream status");
        }
    }
}

/// Snapshot of a thread plus the stream statuses of its latest round
async fn load_attachment(
    threads: &dyn ThreadService,
    stream_status: &dyn StreamStatusStore,
    thread_id: &str,
) -> Result<RoundEvent> {
    let snapshot = threads.load_thread(thread_id).await?;
    let stream_statuses = match snapshot.latest_round_number() {
        Some(round_number) => stream_status.list_round(thread_id, round_number).await?,
        None => Vec::new(),
    };
    Ok(RoundEvent::Attached {
        snapshot,
        stream_statuses,
        at: Utc::now(),
    })
}

fn submission(content: String) -> RoundEvent {
    RoundEvent::MessageSubmitted {
        message_id: new_id(),
        research_id: new_id(),
        synthesis_id: new_id(),
        content,
        at: Utc::now(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
