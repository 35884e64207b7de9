//! Prelude module for convenient imports
//!
//! ```rust
//! use roundtable::prelude::*;
//! ```

pub use crate::{
    init_logging, replay_text, ChatMode, ChunkStream, Command, EngineConfig, EngineError,
    MemoryBackend, Message, ModeratorClient, Orchestrator, OrchestratorHandle, Participant,
    ParticipantClient, ParticipantRequest, RoundConfig, RoundState, ScreenMode, Settings,
    SynthesisRequest, TimelineItem, TimeoutPolicy,
};
