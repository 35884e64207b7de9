use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roundtable_types::{
    roster, ChangeRecord, Message, Participant, ResearchRecord, RoundConfig, StreamKey,
    SynthesisRecord, Thread, ThreadSnapshot,
};

use crate::triggers::{Subsystem, TriggerLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenMode {
    /// The landing screen a thread is created from
    Overview,
    Thread,
}

impl Default for ScreenMode {
    fn default() -> Self {
        ScreenMode::Overview
    }
}

/// Round State Container.
///
/// Plain data plus mutators and derived queries. Nothing here decides what
/// happens next; writes are never rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub thread: Option<Thread>,
    /// Configuration the latest round runs with
    pub config: RoundConfig,
    /// Staged edits, applied at the next submission
    pub draft: RoundConfig,
    pub messages: Vec<Message>,
    pub research: BTreeMap<u32, ResearchRecord>,
    pub syntheses: BTreeMap<u32, SynthesisRecord>,
    pub change_records: BTreeMap<u32, ChangeRecord>,
    /// Expected participants of each round, fixed when the round starts
    pub round_rosters: BTreeMap<u32, Vec<Participant>>,

    /// A participant or synthesis stream is in flight
    pub is_streaming: bool,
    /// Round the engine is driving, until it completes
    pub streaming_round_number: Option<u32>,
    pub current_participant_index: Option<usize>,
    pub waiting_to_start_streaming: bool,
    pub next_participant_to_trigger: Option<usize>,

    pub config_change_round_number: Option<u32>,
    pub config_change_started_at: Option<DateTime<Utc>>,
    pub is_waiting_for_changelog: bool,

    pub screen_mode: ScreenMode,
    /// User message shown before the thread exists server-side
    pub has_early_optimistic_message: bool,
    pub is_online: bool,
    pub queued_input: Option<String>,
    pub error: Option<String>,

    /// `(round, participant index)` streams that ended during this attachment
    pub settled_streams: BTreeSet<(u32, usize)>,
    /// Stream reported active elsewhere that the engine is waiting on
    pub awaiting_stream: Option<StreamKey>,
    pub reload_attempted: bool,
    /// Round whose persisted responses are being dropped for regeneration
    pub discarding_round: Option<u32>,

    #[serde(skip)]
    pub triggers: TriggerLedger,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            thread: None,
            config: RoundConfig::default(),
            draft: RoundConfig::default(),
            messages: Vec::new(),
            research: BTreeMap::new(),
            syntheses: BTreeMap::new(),
            change_records: BTreeMap::new(),
            round_rosters: BTreeMap::new(),
            is_streaming: false,
            streaming_round_number: None,
            current_participant_index: None,
            waiting_to_start_streaming: false,
            next_participant_to_trigger: None,
            config_change_round_number: None,
            config_change_started_at: None,
            is_waiting_for_changelog: false,
            screen_mode: ScreenMode::default(),
            has_early_optimistic_message: false,
            is_online: true,
            queued_input: None,
            error: None,
            settled_streams: BTreeSet::new(),
            awaiting_stream: None,
            reload_attempted: false,
            discarding_round: None,
            triggers: TriggerLedger::default(),
        }
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh container for the overview screen, with `config` staged
    pub fn with_config(config: RoundConfig) -> Self {
        Self {
            draft: config.clone(),
            config,
            ..Self::default()
        }
    }

    // ---- mutators -------------------------------------------------------

    pub fn set_thread(&mut self, thread: Thread) {
        self.thread = Some(thread);
    }

    /// Insert a message, replacing any message with the same id
    pub fn upsert_message(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn remove_message(&mut self, message_id: &str) -> Option<Message> {
        let position = self.messages.iter().position(|m| m.id == message_id)?;
        Some(self.messages.remove(position))
    }

    /// Drop every assistant message of a round, moderator included
    pub fn remove_round_responses(&mut self, round_number: u32) {
        self.messages
            .retain(|m| m.round_number != round_number || m.is_user());
    }

    pub fn set_research(&mut self, record: ResearchRecord) {
        self.research.insert(record.round_number, record);
    }

    pub fn remove_research(&mut self, round_number: u32) -> Option<ResearchRecord> {
        self.research.remove(&round_number)
    }

    pub fn research_mut(&mut self, round_number: u32) -> Option<&mut ResearchRecord> {
        self.research.get_mut(&round_number)
    }

    pub fn set_synthesis(&mut self, record: SynthesisRecord) {
        self.syntheses.insert(record.round_number, record);
    }

    pub fn synthesis_mut(&mut self, round_number: u32) -> Option<&mut SynthesisRecord> {
        self.syntheses.get_mut(&round_number)
    }

    pub fn set_change_record(&mut self, record: ChangeRecord) {
        self.change_records.insert(record.round_number, record);
    }

    pub fn set_round_roster(&mut self, round_number: u32, participants: Vec<Participant>) {
        self.round_rosters.insert(round_number, participants);
    }

    pub fn mark_stream_settled(&mut self, round_number: u32, participant_index: usize) {
        self.settled_streams.insert((round_number, participant_index));
    }

    pub fn clear_settled_streams(&mut self, round_number: u32) {
        self.settled_streams.retain(|(round, _)| *round != round_number);
    }

    /// Point the streaming flags at a round that is about to run
    pub fn begin_round(&mut self, round_number: u32) {
        self.streaming_round_number = Some(round_number);
        self.waiting_to_start_streaming = true;
        self.is_streaming = false;
        self.current_participant_index = None;
        self.next_participant_to_trigger = Some(0);
    }

    pub fn finish_round(&mut self) {
        self.streaming_round_number = None;
        self.waiting_to_start_streaming = false;
        self.is_streaming = false;
        self.current_participant_index = None;
        self.next_participant_to_trigger = None;
    }

    /// Replace persisted entities with a loaded snapshot.
    ///
    /// Local messages the snapshot does not know yet are kept while an early
    /// optimistic message is shown.
    pub fn apply_snapshot(&mut self, snapshot: ThreadSnapshot) {
        let local = std::mem::take(&mut self.messages);
        self.messages = snapshot.messages;
        if self.has_early_optimistic_message {
            for message in local {
                if !self.messages.iter().any(|m| m.id == message.id) {
                    self.messages.push(message);
                }
            }
        }

        self.config = RoundConfig::new(
            snapshot.participants,
            snapshot.thread.mode,
            snapshot.thread.enable_web_search,
        );
        self.draft = self.config.clone();
        self.research = snapshot
            .research
            .into_iter()
            .map(|r| (r.round_number, r))
            .collect();
        self.syntheses = snapshot
            .syntheses
            .into_iter()
            .map(|s| (s.round_number, s))
            .collect();
        self.change_records = snapshot
            .change_records
            .into_iter()
            .map(|c| (c.round_number, c))
            .collect();
        self.thread = Some(snapshot.thread);
    }

    /// Assign the server's thread id to records created before it existed
    pub fn adopt_thread_id(&mut self, thread_id: &str) {
        for message in self.messages.iter_mut().filter(|m| m.thread_id.is_empty()) {
            message.thread_id = thread_id.to_string();
        }
        for record in self.research.values_mut().filter(|r| r.thread_id.is_empty()) {
            record.thread_id = thread_id.to_string();
        }
        for record in self.syntheses.values_mut().filter(|s| s.thread_id.is_empty()) {
            record.thread_id = thread_id.to_string();
        }
    }

    // ---- queries --------------------------------------------------------

    pub fn thread_id(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| t.id.as_str())
    }

    pub fn latest_round_number(&self) -> Option<u32> {
        self.messages.iter().map(|m| m.round_number).max()
    }

    /// Round number a new submission gets; never reuses one
    pub fn next_round_number(&self) -> u32 {
        self.latest_round_number().map(|n| n + 1).unwrap_or(0)
    }

    pub fn research(&self, round_number: u32) -> Option<&ResearchRecord> {
        self.research.get(&round_number)
    }

    pub fn synthesis(&self, round_number: u32) -> Option<&SynthesisRecord> {
        self.syntheses.get(&round_number)
    }

    pub fn change_record(&self, round_number: u32) -> Option<&ChangeRecord> {
        self.change_records.get(&round_number)
    }

    pub fn has_research_been_triggered(&self, round_number: u32) -> bool {
        self.triggers.has_triggered(Subsystem::Research, round_number)
    }

    pub fn has_synthesis_been_triggered(&self, round_number: u32) -> bool {
        self.triggers.has_triggered(Subsystem::Synthesis, round_number)
    }

    /// Synthesis reached `complete` or `failed`
    pub fn is_round_complete(&self, round_number: u32) -> bool {
        self.synthesis(round_number)
            .map(|s| s.status.is_terminal())
            .unwrap_or(false)
    }

    /// Expected participants of a round; falls back to the current roster
    pub fn round_roster(&self, round_number: u32) -> Vec<Participant> {
        self.round_rosters
            .get(&round_number)
            .cloned()
            .unwrap_or_else(|| roster(&self.config.participants))
    }

    pub fn round_messages(&self, round_number: u32) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |m| m.round_number == round_number)
    }

    pub fn user_message(&self, round_number: u32) -> Option<&Message> {
        self.round_messages(round_number).find(|m| m.is_user())
    }

    /// Message of participant `index` in a round.
    ///
    /// When duplicates exist, a settled one wins over a streaming or
    /// interrupted one, and later beats earlier.
    pub fn participant_message(&self, round_number: u32, index: usize) -> Option<&Message> {
        let mut candidates = self
            .round_messages(round_number)
            .filter(|m| m.is_participant() && m.participant_index == Some(index));
        let mut best: Option<&Message> = candidates.next();
        for message in candidates {
            let replace = match best {
                Some(current) => message.is_settled() || !current.is_settled(),
                None => true,
            };
            if replace {
                best = Some(message);
            }
        }
        best
    }

    pub fn moderator_message(&self, round_number: u32) -> Option<&Message> {
        self.round_messages(round_number).find(|m| m.is_moderator)
    }

    /// The participant stream of this round ended while attached
    pub fn is_stream_settled(&self, round_number: u32, index: usize) -> bool {
        self.settled_streams.contains(&(round_number, index))
    }
}

/// Non-negative time between two instants
pub(crate) fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundtable_types::FinishReason;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_next_round_number() {
        let mut state = RoundState::new();
        assert_eq!(state.next_round_number(), 0);

        state.upsert_message(Message::user("u0", "t", 0, "hi", now()));
        state.upsert_message(Message::user("u1", "t", 1, "again", now()));
        assert_eq!(state.latest_round_number(), Some(1));
        assert_eq!(state.next_round_number(), 2);
    }

    #[test]
    fn test_participant_message_prefers_settled_duplicate() {
        let mut state = RoundState::new();
        let done = Message::participant("m-a", "t", 0, 0, "p0", now())
            .with_content("answer")
            .with_finish_reason(FinishReason::Stop);
        let partial = Message::participant("m-b", "t", 0, 0, "p0", now()).with_content("ans");
        state.upsert_message(done);
        state.upsert_message(partial);

        assert_eq!(state.participant_message(0, 0).map(|m| m.id.as_str()), Some("m-a"));
        assert!(state.participant_message(0, 1).is_none());
    }

    #[test]
    fn test_remove_round_responses_keeps_user() {
        let mut state = RoundState::new();
        state.upsert_message(Message::user("u0", "t", 0, "q", now()));
        state.upsert_message(Message::participant("m0", "t", 0, 0, "p0", now()));
        state.upsert_message(Message::moderator("s0", "t", 0, now()));

        state.remove_round_responses(0);
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].is_user());
    }

    #[test]
    fn test_serializes_without_trigger_ledger() {
        let mut state = RoundState::new();
        state.triggers.try_acquire(Subsystem::Research, 0);
        state.mark_stream_settled(0, 1);

        let json = serde_json::to_string(&state).unwrap();
        let restored: RoundState = serde_json::from_str(&json).unwrap();
        assert!(restored.triggers.is_empty());
        assert!(restored.is_stream_settled(0, 1));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let later = now();
        let earlier = later - chrono::Duration::seconds(5);
        assert_eq!(elapsed(earlier, later), Duration::from_secs(5));
        assert_eq!(elapsed(later, earlier), Duration::ZERO);
    }
}
