//! # Roundtable
//!
//! Orchestration engine for conversations in which several AI participants
//! answer one user message in turn, optionally after a web-research step, and a
//! moderator synthesizes the round.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use roundtable::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ParticipantClient for Echo {
//!     async fn stream_participant(&self, request: ParticipantRequest) -> anyhow::Result<ChunkStream> {
//!         Ok(replay_text(&format!("{} agrees", request.participant.id), "stop"))
//!     }
//! }
//!
//! #[async_trait]
//! impl ModeratorClient for Echo {
//!     async fn stream_synthesis(&self, _request: SynthesisRequest) -> anyhow::Result<ChunkStream> {
//!         Ok(replay_text("Everyone agrees", "stop"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     init_logging(&settings.logging)?;
//!
//!     let orchestrator = Orchestrator::builder()
//!         .backend(Arc::new(MemoryBackend::new()))
//!         .round_client(Arc::new(Echo))
//!         .config(settings.engine_config())
//!         .build()?;
//!
//!     let config = RoundConfig::new(
//!         vec![Participant::new("p-0", "gpt-4o", 0), Participant::new("p-1", "claude", 1)],
//!         ChatMode::Analyzing,
//!         false,
//!     );
//!     let handle = orchestrator.spawn_with_state(RoundState::with_config(config));
//!
//!     handle
//!         .dispatch(Command::SubmitMessage { content: "Monolith or services?".into() })
//!         .await?;
//!     handle
//!         .wait_until(|s| s.is_round_complete(0), Duration::from_secs(30))
//!         .await?;
//!
//!     for item in handle.timeline() {
//!         println!("{:?}", item);
//!     }
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`roundtable-types`**: threads, messages, records, events and the timeout policy
//! - **`roundtable-llm`**: participant/moderator client traits and stream accumulation
//! - **`roundtable-persist`**: persistence traits and the in-memory backend
//! - **`roundtable-engine`**: the round reducer and its tokio runtime

pub mod logging;
pub mod prelude;
pub mod settings;

pub use logging::init_logging;
pub use settings::{EngineSettings, LoggingSettings, PolicySettings, Settings};

pub use roundtable_types as types;
pub use roundtable_llm as llm;
pub use roundtable_persist as persist;
pub use roundtable_engine as engine;

pub use roundtable_engine::{
    Effect, EngineError, NavigationReason, Orchestrator, OrchestratorBuilder, OrchestratorHandle,
    Reducer, RoundState, ScreenMode, TimelineItem,
};

pub use roundtable_llm::{
    replay, replay_text, ChunkStream, ModeratorClient, ParticipantClient, ParticipantRequest,
    RoundClient, StreamChunk, SynthesisRequest,
};

pub use roundtable_persist::{
    ChangeRecordService, MemoryBackend, PersistError, ResearchService, StreamStatusStore,
    ThreadService,
};

pub use roundtable_types::{
    ChatMode, Command, EngineConfig, Message, Participant, RoundConfig, RoundEvent, Thread,
    TimeoutPolicy,
};
