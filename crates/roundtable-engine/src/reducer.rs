use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use roundtable_llm::{ParticipantRequest, SynthesisRequest};
use roundtable_persist::CreateThreadRequest;
use roundtable_types::{
    roster, ChangeRecord, FinishReason, Message, Participant, RecordStatus, ResearchRecord,
    ResearchResult, RoundConfig, RoundEvent, StreamKey, StreamStatusEntry, SynthesisRecord,
    Thread, ThreadSnapshot, TimeoutPolicy,
};

use crate::gates::{config_change, research};
use crate::navigation::{self, NavigationDecision, NavigationReason};
use crate::resumption::{self, ResumeAction};
use crate::router::{NextStep, RoundRouter, Router};
use crate::sequencer;
use crate::state::{RoundState, ScreenMode};
use crate::synthesis;
use crate::triggers::Subsystem;

/// Work the reducer asks the runtime to perform.
///
/// Every effect that talks to a collaborator reports back through events.
#[derive(Debug, Clone)]
pub enum Effect {
    CreateThread {
        request: CreateThreadRequest,
    },
    AwaitTitle {
        thread_id: String,
    },
    PersistConfiguration {
        thread_id: String,
        round_number: u32,
        config: RoundConfig,
    },
    FetchChangeRecord {
        thread_id: String,
        round_number: u32,
    },
    PersistMessage {
        message: Message,
    },
    PersistSynthesis {
        record: SynthesisRecord,
    },
    StartResearch {
        thread_id: String,
        round_number: u32,
        query: String,
    },
    ObserveResearch {
        thread_id: String,
        round_number: u32,
    },
    StreamParticipant {
        request: ParticipantRequest,
        /// Id of an interrupted message to overwrite
        message_id: Option<String>,
    },
    StreamSynthesis {
        request: SynthesisRequest,
        message_id: Option<String>,
    },
    DiscardRound {
        thread_id: String,
        round_number: u32,
    },
    AwaitActiveStream {
        key: StreamKey,
    },
    ReloadThread {
        thread_id: String,
    },
    /// Input queued while offline, to be submitted with fresh ids
    SubmitQueued {
        content: String,
    },
    Navigate {
        thread_id: String,
        slug: String,
        reason: NavigationReason,
    },
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::CreateThread { .. } => "create_thread",
            Effect::AwaitTitle { .. } => "await_title",
            Effect::PersistConfiguration { .. } => "persist_configuration",
            Effect::FetchChangeRecord { .. } => "fetch_change_record",
            Effect::PersistMessage { .. } => "persist_message",
            Effect::PersistSynthesis { .. } => "persist_synthesis",
            Effect::StartResearch { .. } => "start_research",
            Effect::ObserveResearch { .. } => "observe_research",
            Effect::StreamParticipant { .. } => "stream_participant",
            Effect::StreamSynthesis { .. } => "stream_synthesis",
            Effect::DiscardRound { .. } => "discard_round",
            Effect::AwaitActiveStream { .. } => "await_active_stream",
            Effect::ReloadThread { .. } => "reload_thread",
            Effect::SubmitQueued { .. } => "submit_queued",
            Effect::Navigate { .. } => "navigate",
        }
    }
}

/// Pure transition function over [`RoundState`].
///
/// `reduce` mutates the container for one event and returns the effects the
/// runtime must execute. It never reads a clock; time comes from the events.
pub struct Reducer<R: Router = RoundRouter> {
    policy: TimeoutPolicy,
    router: R,
}

impl Reducer<RoundRouter> {
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            policy,
            router: RoundRouter,
        }
    }
}

impl Default for Reducer<RoundRouter> {
    fn default() -> Self {
        Self::new(TimeoutPolicy::default())
    }
}

impl<R: Router> Reducer<R> {
    pub fn with_router(policy: TimeoutPolicy, router: R) -> Self {
        Self { policy, router }
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    pub fn reduce(&self, state: &mut RoundState, event: RoundEvent) -> Vec<Effect> {
        let now = event.at();
        let mut effects = Vec::new();

        match event {
            RoundEvent::MessageSubmitted {
                message_id,
                research_id,
                synthesis_id,
                content,
                at,
            } => self.on_submit(
                state,
                Submission {
                    message_id,
                    research_id,
                    synthesis_id,
                    content,
                    at,
                },
                &mut effects,
            ),

            RoundEvent::WebSearchToggled { enabled } => state.draft.enable_web_search = enabled,
            RoundEvent::ParticipantsUpdated { participants } => state.draft.participants = participants,
            RoundEvent::ModeChanged { mode } => state.draft.mode = mode,

            RoundEvent::RoundRetryRequested {
                round_number,
                research_id,
                synthesis_id,
                at,
            } => self.on_retry(state, round_number, research_id, synthesis_id, at, &mut effects),

            RoundEvent::RoundDiscarded { round_number, at } => {
                if state.discarding_round == Some(round_number) {
                    state.discarding_round = None;
                    self.advance(state, round_number, at, &mut effects);
                }
            }

            RoundEvent::RoundDiscardFailed {
                round_number,
                error,
                at,
            } => {
                error!(round_number, %error, "Failed to discard round responses; regenerating anyway");
                if state.discarding_round == Some(round_number) {
                    state.discarding_round = None;
                    self.advance(state, round_number, at, &mut effects);
                }
            }

            RoundEvent::ConnectivityChanged { online, .. } => {
                state.is_online = online;
                if online {
                    if let Some(content) = state.queued_input.take() {
                        info!("Back online, submitting queued input");
                        effects.push(Effect::SubmitQueued { content });
                    }
                }
            }

            RoundEvent::ThreadCreated {
                thread,
                participants,
                at,
            } => self.on_thread_created(state, thread, participants, at, &mut effects),

            RoundEvent::ThreadCreationFailed { error, .. } => {
                error!(%error, "Thread creation failed");
                state.messages.retain(|m| !m.thread_id.is_empty());
                state.research.retain(|_, r| !r.thread_id.is_empty());
                state.syntheses.retain(|_, s| !s.thread_id.is_empty());
                state.has_early_optimistic_message = false;
                state.finish_round();
                state.error = Some(format!("Failed to create thread: {}", error));
            }

            RoundEvent::TitleReady { title, .. } => {
                if let Some(thread) = state.thread.as_mut() {
                    thread.title = Some(title);
                    thread.is_ai_generated_title = true;
                }
            }

            RoundEvent::ConfigurationPersisted {
                round_number,
                thread,
                ..
            } => self.on_configuration_persisted(state, round_number, thread, &mut effects),

            RoundEvent::ConfigurationPersistFailed {
                round_number,
                error,
                ..
            } => {
                error!(round_number, %error, "Failed to persist configuration; round stays blocked");
                state.error = Some(format!("Failed to save configuration: {}", error));
            }

            RoundEvent::ChangeRecordFetched { record, at } => {
                self.on_change_record(state, record, at, &mut effects)
            }

            RoundEvent::ChangeRecordFetchFailed {
                round_number,
                error,
                ..
            } => {
                error!(round_number, %error, "Failed to fetch change record; round stays blocked");
                state.error = Some(format!("Failed to load configuration changes: {}", error));
            }

            RoundEvent::ResearchStarted { round_number, .. } => {
                if let Some(record) = state.research_mut(round_number) {
                    if record.status == RecordStatus::Pending {
                        record.status = RecordStatus::Streaming;
                    }
                }
            }

            RoundEvent::ResearchCompleted {
                round_number,
                result,
                at,
            } => self.on_research_settled(state, round_number, Ok(result), at, &mut effects),

            RoundEvent::ResearchFailed {
                round_number,
                error,
                at,
            } => self.on_research_settled(state, round_number, Err(error), at, &mut effects),

            RoundEvent::ParticipantStreamStarted {
                round_number,
                participant_index,
                participant_id,
                message_id,
                at,
            } => {
                let thread_id = state.thread_id().unwrap_or_default().to_string();
                state.upsert_message(Message::participant(
                    message_id,
                    thread_id,
                    round_number,
                    participant_index,
                    participant_id,
                    at,
                ));
                if state.streaming_round_number == Some(round_number) {
                    state.is_streaming = true;
                    state.current_participant_index = Some(participant_index);
                    state.waiting_to_start_streaming = false;
                }
            }

            RoundEvent::ParticipantChunk {
                round_number,
                participant_index,
                content,
            } => match streaming_participant_message(state, round_number, participant_index) {
                Some(message) => message.content.push_str(&content),
                None => debug!(round_number, participant_index, "Dropping chunk for unknown stream"),
            },

            RoundEvent::ParticipantCompleted {
                round_number,
                participant_index,
                finish_reason,
                at,
            } => {
                if finish_reason == FinishReason::Unknown {
                    warn!(round_number, participant_index, "Participant returned an empty response");
                }
                self.on_participant_settled(
                    state,
                    round_number,
                    participant_index,
                    finish_reason,
                    at,
                    &mut effects,
                );
            }

            RoundEvent::ParticipantFailed {
                round_number,
                participant_index,
                error,
                at,
            } => {
                error!(round_number, participant_index, %error, "Participant stream failed");
                state.error = Some(format!("Participant {} failed: {}", participant_index, error));
                self.on_participant_settled(
                    state,
                    round_number,
                    participant_index,
                    FinishReason::Error,
                    at,
                    &mut effects,
                );
            }

            RoundEvent::SynthesisStarted {
                round_number,
                message_id,
                at,
            } => {
                let thread_id = state.thread_id().unwrap_or_default().to_string();
                if let Some(record) = state.synthesis_mut(round_number) {
                    record.start_streaming(at);
                    effects.push(Effect::PersistSynthesis {
                        record: record.clone(),
                    });
                }
                state.upsert_message(Message::moderator(message_id, thread_id, round_number, at));
                if state.streaming_round_number == Some(round_number) {
                    state.is_streaming = true;
                }
            }

            RoundEvent::SynthesisChunk {
                round_number,
                content,
            } => match streaming_moderator_message(state, round_number) {
                Some(message) => message.content.push_str(&content),
                None => debug!(round_number, "Dropping synthesis chunk for unknown stream"),
            },

            RoundEvent::SynthesisCompleted { round_number, at } => {
                self.on_synthesis_settled(state, round_number, None, at, &mut effects)
            }

            RoundEvent::SynthesisFailed {
                round_number,
                error,
                at,
            } => self.on_synthesis_settled(state, round_number, Some(error), at, &mut effects),

            RoundEvent::Attached {
                snapshot,
                stream_statuses,
                at,
            } => self.on_attached(state, snapshot, stream_statuses, at, &mut effects),

            RoundEvent::Tick { at } => {
                if let Some(timeout) = config_change::check_timeout(state, &self.policy, at) {
                    warn!(
                        round_number = timeout.round_number,
                        waited_ms = timeout.waited.as_millis() as u64,
                        was_waiting_for_changelog = timeout.was_waiting_for_changelog,
                        "Configuration change did not settle in time; releasing the round"
                    );
                    self.advance_if_driven(state, timeout.round_number, at, &mut effects);
                }
            }
        }

        if let Some(now) = now {
            self.evaluate_navigation(state, now, &mut effects);
        }
        effects
    }

    fn on_submit(&self, state: &mut RoundState, submission: Submission, effects: &mut Vec<Effect>) {
        if submission.content.trim().is_empty() {
            debug!("Ignoring empty submission");
            return;
        }
        if !state.is_online {
            info!("Offline, queueing input until connectivity returns");
            state.queued_input = Some(submission.content);
            return;
        }
        if state.has_early_optimistic_message || state.streaming_round_number.is_some() {
            warn!(
                round_number = ?state.streaming_round_number,
                "Ignoring submission while a round is in progress"
            );
            return;
        }

        let participants = roster(&state.draft.participants);
        if participants.is_empty() {
            warn!("Ignoring submission without enabled participants");
            state.error = Some("No enabled participants".to_string());
            return;
        }

        match state.thread_id().map(str::to_string) {
            None => self.start_thread(state, submission, participants, effects),
            Some(thread_id) => self.start_round(state, thread_id, submission, participants, effects),
        }
    }

    /// Round 0: the thread does not exist yet and creation carries the config
    fn start_thread(
        &self,
        state: &mut RoundState,
        submission: Submission,
        participants: Vec<Participant>,
        effects: &mut Vec<Effect>,
    ) {
        let Submission {
            message_id,
            research_id,
            synthesis_id,
            content,
            at,
        } = submission;

        state.config = state.draft.clone();
        state.error = None;
        state.screen_mode = ScreenMode::Overview;
        state.has_early_optimistic_message = true;
        state.upsert_message(Message::user(message_id.clone(), "", 0, content.clone(), at));
        state.set_round_roster(0, participants);
        if state.config.enable_web_search {
            research::create(
                state,
                ResearchRecord::pending(research_id, "", 0, content.clone(), at),
            );
        }
        state.set_synthesis(SynthesisRecord::placeholder(synthesis_id, "", 0, at));
        state.begin_round(0);

        info!(
            participants = state.round_roster(0).len(),
            web_search = state.config.enable_web_search,
            "Creating thread"
        );
        effects.push(Effect::CreateThread {
            request: CreateThreadRequest::new(message_id, content).with_config(state.config.clone()),
        });
    }

    fn start_round(
        &self,
        state: &mut RoundState,
        thread_id: String,
        submission: Submission,
        participants: Vec<Participant>,
        effects: &mut Vec<Effect>,
    ) {
        let Submission {
            message_id,
            research_id,
            synthesis_id,
            content,
            at,
        } = submission;
        let round_number = state.next_round_number();

        let changes = state.config.diff(&state.draft);
        if !changes.is_empty() {
            state.config = state.draft.clone();
            if let Some(thread) = state.thread.as_mut() {
                thread.mode = state.config.mode;
                thread.enable_web_search = state.config.enable_web_search;
            }
            if state.triggers.try_acquire(Subsystem::Configuration, round_number) {
                config_change::begin(state, round_number, at);
                info!(
                    %thread_id,
                    round_number,
                    changes = changes.len(),
                    "Configuration changed; persisting before the round starts"
                );
                effects.push(Effect::PersistConfiguration {
                    thread_id: thread_id.clone(),
                    round_number,
                    config: state.config.clone(),
                });
            } else {
                debug!(round_number, "Configuration of this round already persisted");
            }
        }

        state.error = None;
        state.reload_attempted = false;
        state.set_round_roster(round_number, participants);

        let message = Message::user(message_id, thread_id.clone(), round_number, content.clone(), at);
        state.upsert_message(message.clone());
        effects.push(Effect::PersistMessage { message });

        if state.config.enable_web_search {
            research::create(
                state,
                ResearchRecord::pending(research_id, thread_id.clone(), round_number, content, at),
            );
        }
        state.set_synthesis(SynthesisRecord::placeholder(
            synthesis_id,
            thread_id.clone(),
            round_number,
            at,
        ));
        state.begin_round(round_number);

        info!(%thread_id, round_number, "Round started");
        self.advance(state, round_number, at, effects);
    }

    fn on_thread_created(
        &self,
        state: &mut RoundState,
        thread: Thread,
        participants: Vec<Participant>,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        if !state.has_early_optimistic_message {
            debug!(thread_id = %thread.id, "Thread created without a pending submission");
        }

        let thread_id = thread.id.clone();
        state.triggers.reset_for_thread(&thread_id);
        state.adopt_thread_id(&thread_id);
        state.has_early_optimistic_message = false;
        state.config = RoundConfig::new(participants, thread.mode, thread.enable_web_search);
        state.draft = state.config.clone();
        state.set_round_roster(0, roster(&state.config.participants));
        state.set_thread(thread);

        info!(%thread_id, "Thread created");
        effects.push(Effect::AwaitTitle {
            thread_id: thread_id.clone(),
        });
        self.advance_if_driven(state, 0, at, effects);
    }

    fn on_configuration_persisted(
        &self,
        state: &mut RoundState,
        round_number: u32,
        thread: Thread,
        effects: &mut Vec<Effect>,
    ) {
        if let Some(local) = state.thread.as_mut() {
            local.mode = thread.mode;
            local.enable_web_search = thread.enable_web_search;
            local.updated_at = thread.updated_at;
        }

        if config_change::on_persisted(state, round_number) {
            debug!(round_number, "Configuration persisted; fetching change record");
            effects.push(Effect::FetchChangeRecord {
                thread_id: thread.id,
                round_number,
            });
        } else {
            debug!(round_number, "Configuration persisted for a round no longer pending");
        }
    }

    fn on_change_record(
        &self,
        state: &mut RoundState,
        record: ChangeRecord,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let round_number = record.round_number;
        if config_change::on_change_record(state, record) {
            info!(round_number, "Change record received; round unblocked");
            self.advance_if_driven(state, round_number, at, effects);
        } else {
            debug!(round_number, "Change record for a round that was not blocked");
        }
    }

    fn on_research_settled(
        &self,
        state: &mut RoundState,
        round_number: u32,
        outcome: std::result::Result<ResearchResult, String>,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(record) = state.research_mut(round_number) else {
            debug!(round_number, "Research result for a round without research");
            return;
        };
        match outcome {
            Ok(result) => {
                record.complete(result, at);
                info!(round_number, "Research complete");
            }
            Err(error) => {
                record.fail(error.clone(), at);
                warn!(round_number, %error, "Research failed; participants continue without it");
            }
        }
        self.advance_if_driven(state, round_number, at, effects);
    }

    fn on_participant_settled(
        &self,
        state: &mut RoundState,
        round_number: u32,
        participant_index: usize,
        finish_reason: FinishReason,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        if let Some(message) = streaming_participant_message(state, round_number, participant_index) {
            message.finish_reason = Some(finish_reason);
            let message = message.clone();
            effects.push(Effect::PersistMessage { message });
        }
        state.mark_stream_settled(round_number, participant_index);

        if state.streaming_round_number == Some(round_number) {
            if state.current_participant_index == Some(participant_index) {
                state.is_streaming = false;
            }
            debug!(round_number, participant_index, ?finish_reason, "Participant settled");
            self.advance(state, round_number, at, effects);
        }
    }

    fn on_synthesis_settled(
        &self,
        state: &mut RoundState,
        round_number: u32,
        error: Option<String>,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let finish_reason = match &error {
            None => FinishReason::Stop,
            Some(_) => FinishReason::Error,
        };

        if let Some(record) = state.synthesis_mut(round_number) {
            match &error {
                None => record.complete(at),
                Some(error) => record.fail(error.clone(), at),
            }
            effects.push(Effect::PersistSynthesis {
                record: record.clone(),
            });
        }
        if let Some(message) = streaming_moderator_message(state, round_number) {
            message.finish_reason = Some(finish_reason);
            let message = message.clone();
            effects.push(Effect::PersistMessage { message });
        }

        match error {
            None => info!(round_number, "Synthesis complete"),
            Some(error) => {
                error!(round_number, %error, "Synthesis failed");
                state.error = Some(format!("Synthesis failed: {}", error));
            }
        }

        if state.streaming_round_number == Some(round_number) {
            state.is_streaming = false;
            self.advance(state, round_number, at, effects);
        }
    }

    fn on_retry(
        &self,
        state: &mut RoundState,
        round_number: u32,
        research_id: String,
        synthesis_id: String,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(thread_id) = state.thread_id().map(str::to_string) else {
            warn!(round_number, "Retry requested before the thread exists");
            return;
        };
        if state.latest_round_number() != Some(round_number) {
            warn!(round_number, "Only the latest round can be retried");
            return;
        }
        if state.is_streaming
            || state.discarding_round.is_some()
            || config_change::is_blocked(state, round_number)
        {
            warn!(round_number, "Ignoring retry while the round is busy");
            return;
        }

        let query = state
            .user_message(round_number)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        state.remove_round_responses(round_number);
        state.remove_research(round_number);
        if state.config.enable_web_search {
            research::create(
                state,
                ResearchRecord::pending(research_id, thread_id.clone(), round_number, query, at),
            );
        }
        state.set_synthesis(SynthesisRecord::placeholder(
            synthesis_id,
            thread_id.clone(),
            round_number,
            at,
        ));
        state.triggers.clear_round(round_number);
        state.clear_settled_streams(round_number);
        state.set_round_roster(round_number, roster(&state.config.participants));
        state.error = None;
        state.awaiting_stream = None;
        state.discarding_round = Some(round_number);
        state.begin_round(round_number);

        info!(%thread_id, round_number, "Regenerating round");
        effects.push(Effect::DiscardRound {
            thread_id,
            round_number,
        });
    }

    fn on_attached(
        &self,
        state: &mut RoundState,
        snapshot: ThreadSnapshot,
        stream_statuses: Vec<StreamStatusEntry>,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let thread_id = snapshot.thread.id.clone();
        let thread_changed = state.thread_id() != Some(thread_id.as_str());

        if state.triggers.reset_for_thread(&thread_id) {
            debug!(%thread_id, "Cleared trigger ledger of the previous thread");
        }
        if thread_changed {
            state.settled_streams.clear();
            state.round_rosters.clear();
            state.reload_attempted = false;
            state.discarding_round = None;
            state.error = None;
            state.finish_round();
            config_change::clear(state);
            state.screen_mode = ScreenMode::Thread;
        }
        state.awaiting_stream = None;
        state.apply_snapshot(snapshot);

        let action = resumption::detect(state, &stream_statuses);
        info!(%thread_id, ?action, "Attached to thread");

        match action {
            ResumeAction::Skip(reason) => debug!(?reason, "Resumption skipped"),
            ResumeAction::None => {}
            ResumeAction::ObserveResearch { round_number } => {
                self.resume_round(state, round_number);
                if research::try_start(state, round_number) {
                    effects.push(Effect::ObserveResearch {
                        thread_id,
                        round_number,
                    });
                }
            }
            ResumeAction::StartResearch { round_number } => {
                self.resume_round(state, round_number);
                self.advance(state, round_number, at, effects);
            }
            ResumeAction::ResumeParticipant {
                round_number,
                index,
            } => {
                self.resume_round(state, round_number);
                state
                    .triggers
                    .release(Subsystem::Participant(index), round_number);
                state.settled_streams.remove(&(round_number, index));
                self.advance(state, round_number, at, effects);
            }
            ResumeAction::ResumeSynthesis { round_number } => {
                self.resume_round(state, round_number);
                if let Some(record) = state.synthesis_mut(round_number) {
                    if record.status == RecordStatus::Streaming {
                        record.reset();
                    }
                }
                state.triggers.release(Subsystem::Synthesis, round_number);
                self.advance(state, round_number, at, effects);
            }
            ResumeAction::AwaitActiveStream { key } => {
                self.resume_round(state, key.round_number);
                state.reload_attempted = true;
                state.awaiting_stream = Some(key.clone());
                effects.push(Effect::AwaitActiveStream { key });
            }
            ResumeAction::Reload => {
                state.reload_attempted = true;
                effects.push(Effect::ReloadThread { thread_id });
            }
        }
    }

    fn resume_round(&self, state: &mut RoundState, round_number: u32) {
        if !state.round_rosters.contains_key(&round_number) {
            let participants = roster(&state.config.participants);
            state.set_round_roster(round_number, participants);
        }
        state.begin_round(round_number);
    }

    fn advance_if_driven(
        &self,
        state: &mut RoundState,
        round_number: u32,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        if state.streaming_round_number == Some(round_number) {
            self.advance(state, round_number, at, effects);
        }
    }

    /// Ask the router what the round needs and start it, at most once
    fn advance(
        &self,
        state: &mut RoundState,
        round_number: u32,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        synthesis::populate_if_ready(state, round_number, at);
        let thread_id = state.thread_id().unwrap_or_default().to_string();

        match self.router.next(state, round_number) {
            NextStep::StartResearch => {
                if research::try_start(state, round_number) {
                    let query = state
                        .research(round_number)
                        .map(|r| r.user_query.clone())
                        .unwrap_or_default();
                    info!(%thread_id, round_number, "Starting research");
                    effects.push(Effect::StartResearch {
                        thread_id,
                        round_number,
                        query,
                    });
                }
            }

            NextStep::StreamParticipant { index, participant } => {
                if !state
                    .triggers
                    .try_acquire(Subsystem::Participant(index), round_number)
                {
                    return;
                }
                let message_id = take_interrupted_participant_message(state, round_number, index);
                let request = sequencer::build_request(state, round_number, index, participant);

                state.is_streaming = true;
                state.current_participant_index = Some(index);
                state.next_participant_to_trigger = Some(index + 1);
                state.waiting_to_start_streaming = false;

                info!(
                    %thread_id,
                    round_number,
                    participant_index = index,
                    participant_id = %request.participant.id,
                    "Starting participant"
                );
                effects.push(Effect::StreamParticipant {
                    request,
                    message_id,
                });
            }

            NextStep::StartSynthesis => {
                if !synthesis::try_start(state, round_number) {
                    return;
                }
                let message_id = take_interrupted_moderator_message(state, round_number);
                let request = synthesis::build_request(state, round_number);

                state.is_streaming = true;
                state.current_participant_index = None;
                state.next_participant_to_trigger = None;

                info!(%thread_id, round_number, "Starting synthesis");
                effects.push(Effect::StreamSynthesis {
                    request,
                    message_id,
                });
            }

            NextStep::RoundComplete => {
                if state.streaming_round_number == Some(round_number) {
                    state.finish_round();
                    info!(%thread_id, round_number, "Round complete");
                }
            }

            step => debug!(round_number, ?step, "Round waiting"),
        }
    }

    fn evaluate_navigation(&self, state: &mut RoundState, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        let NavigationDecision::Navigate(reason) = navigation::evaluate(state, &self.policy, now) else {
            return;
        };
        state.screen_mode = ScreenMode::Thread;

        if let Some(thread) = state.thread.as_ref() {
            match reason {
                NavigationReason::SynthesisComplete | NavigationReason::SynthesisFailed => {
                    info!(thread_id = %thread.id, ?reason, "Navigating to thread")
                }
                _ => warn!(thread_id = %thread.id, ?reason, "Navigating to thread on timeout override"),
            }
            effects.push(Effect::Navigate {
                thread_id: thread.id.clone(),
                slug: thread.slug.clone(),
                reason,
            });
        }
    }
}

struct Submission {
    message_id: String,
    research_id: String,
    synthesis_id: String,
    content: String,
    at: DateTime<Utc>,
}

/// Latest participant message of `(round, index)` still without a finish reason
fn streaming_participant_message(
    state: &mut RoundState,
    round_number: u32,
    index: usize,
) -> Option<&mut Message> {
    state.messages.iter_mut().rev().find(|m| {
        m.round_number == round_number
            && m.is_participant()
            && m.participant_index == Some(index)
            && m.finish_reason.is_none()
    })
}

fn streaming_moderator_message(state: &mut RoundState, round_number: u32) -> Option<&mut Message> {
    state
        .messages
        .iter_mut()
        .rev()
        .find(|m| m.round_number == round_number && m.is_moderator && m.finish_reason.is_none())
}

/// Drop an unsettled message left at `(round, index)` and hand back its id so
/// the restarted stream overwrites it
fn take_interrupted_participant_message(
    state: &mut RoundState,
    round_number: u32,
    index: usize,
) -> Option<String> {
    let ids: Vec<String> = state
        .round_messages(round_number)
        .filter(|m| m.is_participant() && m.participant_index == Some(index) && !sequencer::is_answered(m))
        .map(|m| m.id.clone())
        .collect();
    for id in &ids {
        state.remove_message(id);
    }
    ids.into_iter().next()
}

fn take_interrupted_moderator_message(state: &mut RoundState, round_number: u32) -> Option<String> {
    let ids: Vec<String> = state
        .round_messages(round_number)
        .filter(|m| m.is_moderator)
        .map(|m| m.id.clone())
        .collect();
    for id in &ids {
        state.remove_message(id);
    }
    ids.into_iter().next()
}
