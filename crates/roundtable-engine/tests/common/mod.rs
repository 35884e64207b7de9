#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use roundtable_engine::{Effect, Reducer, RoundState};
use roundtable_llm::{
    replay, ChunkStream, ModeratorClient, ParticipantClient, ParticipantRequest, StreamChunk,
    SynthesisRequest,
};
use roundtable_types::{ChatMode, Participant, RoundConfig, RoundEvent};

/// What a scripted model does when asked to stream
#[derive(Debug, Clone)]
pub enum Script {
    Text(String),
    /// Reports done without producing any content
    Empty,
    /// The request itself is rejected
    FailOpen(String),
    /// Some content, then a transport error
    FailMidway { partial: String, error: String },
}

impl Script {
    fn into_stream(self, pace: Option<Duration>) -> Result<ChunkStream> {
        let chunks = match self {
            Script::Text(text) => {
                let mut chunks: Vec<Result<StreamChunk>> = text
                    .split_inclusive(' ')
                    .map(|word| Ok(StreamChunk::message(word)))
                    .collect();
                chunks.push(Ok(StreamChunk::done("stop")));
                chunks
            }
            Script::Empty => vec![Ok(StreamChunk::done("stop"))],
            Script::FailOpen(error) => return Err(anyhow!(error)),
            Script::FailMidway { partial, error } => {
                vec![Ok(StreamChunk::message(partial)), Err(anyhow!(error))]
            }
        };
        Ok(replay(chunks, pace))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Participant {
        round_number: u32,
        index: usize,
        participant_id: String,
        history: usize,
        has_research: bool,
    },
    Synthesis {
        round_number: u32,
        participant_messages: usize,
    },
}

/// Participant and moderator client driven by per-participant scripts
pub struct ScriptedClient {
    participants: Mutex<HashMap<String, Script>>,
    synthesis: Mutex<Script>,
    pace: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            participants: Mutex::new(HashMap::new()),
            synthesis: Mutex::new(Script::Text("The panel agrees on sharding by customer".into())),
            pace: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_participant(self, participant_id: &str, script: Script) -> Self {
        self.participants
            .lock()
            .unwrap()
            .insert(participant_id.to_string(), script);
        self
    }

    pub fn with_synthesis(self, script: Script) -> Self {
        *self.synthesis.lock().unwrap() = script;
        self
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn participant_calls(&self) -> Vec<(u32, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Participant {
                    round_number,
                    index,
                    ..
                } => Some((round_number, index)),
                Call::Synthesis { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ParticipantClient for ScriptedClient {
    async fn stream_participant(&self, request: ParticipantRequest) -> Result<ChunkStream> {
        self.calls.lock().unwrap().push(Call::Participant {
            round_number: request.round_number,
            index: request.participant_index,
            participant_id: request.participant.id.clone(),
            history: request.history.len(),
            has_research: request.research.is_some(),
        });
        let script = self
            .participants
            .lock()
            .unwrap()
            .get(&request.participant.id)
            .cloned()
            .unwrap_or_else(|| Script::Text(format!("{} weighs in", request.participant.id)));
        script.into_stream(self.pace)
    }
}

#[async_trait]
impl ModeratorClient for ScriptedClient {
    async fn stream_synthesis(&self, request: SynthesisRequest) -> Result<ChunkStream> {
        self.calls.lock().unwrap().push(Call::Synthesis {
            round_number: request.round_number,
            participant_messages: request.participant_messages.len(),
        });
        let script = self.synthesis.lock().unwrap().clone();
        script.into_stream(self.pace)
    }
}

pub fn panel(count: usize) -> Vec<Participant> {
    (0..count)
        .map(|i| Participant::new(format!("p-{}", i), format!("model-{}", i), i as u32))
        .collect()
}

pub fn overview(count: usize, web_search: bool) -> RoundState {
    RoundState::with_config(RoundConfig::new(panel(count), ChatMode::Analyzing, web_search))
}

/// Drives a reducer by hand with a controllable clock
pub struct Harness {
    pub reducer: Reducer,
    pub state: RoundState,
    pub now: DateTime<Utc>,
    next_id: usize,
}

impl Harness {
    pub fn new(state: RoundState) -> Self {
        Self {
            reducer: Reducer::default(),
            state,
            now: Utc::now(),
            next_id: 0,
        }
    }

    pub fn advance(&mut self, seconds: i64) -> Vec<Effect> {
        self.now += chrono::Duration::seconds(seconds);
        let at = self.now;
        self.send(RoundEvent::Tick { at })
    }

    pub fn send(&mut self, event: RoundEvent) -> Vec<Effect> {
        self.reducer.reduce(&mut self.state, event)
    }

    pub fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    pub fn submit(&mut self, content: &str) -> Vec<Effect> {
        let event = RoundEvent::MessageSubmitted {
            message_id: self.id("msg"),
            research_id: self.id("research"),
            synthesis_id: self.id("synthesis"),
            content: content.to_string(),
            at: self.now,
        };
        self.send(event)
    }

    /// Start, stream and finish the participant the last effects asked for
    pub fn answer(&mut self, round_number: u32, index: usize, content: &str) -> Vec<Effect> {
        let message_id = self.id("answer");
        let at = self.now;
        self.send(RoundEvent::ParticipantStreamStarted {
            round_number,
            participant_index: index,
            participant_id: format!("p-{}", index),
            message_id,
            at,
        });
        self.send(RoundEvent::ParticipantChunk {
            round_number,
            participant_index: index,
            content: content.to_string(),
        });
        self.send(RoundEvent::ParticipantCompleted {
            round_number,
            participant_index: index,
            finish_reason: roundtable_types::FinishReason::Stop,
            at,
        })
    }
}

pub fn kinds(effects: &[Effect]) -> Vec<&'static str> {
    effects.iter().map(Effect::kind).collect()
}

pub fn streamed_index(effects: &[Effect]) -> Option<usize> {
    effects.iter().find_map(|effect| match effect {
        Effect::StreamParticipant { request, .. } => Some(request.participant_index),
        _ => None,
    })
}
