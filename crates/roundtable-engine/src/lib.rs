//! Round orchestration for multi-participant AI conversations.
//!
//! A [`Reducer`] folds [`RoundEvent`]s into a [`RoundState`] and returns the
//! [`Effect`]s to perform; the [`Orchestrator`] runs that loop on tokio and
//! executes effects against the persistence and model collaborators.

pub mod builder;
pub mod error;
pub mod gates;
pub mod navigation;
pub mod orchestrator;
pub mod reducer;
pub mod resumption;
pub mod router;
pub mod sequencer;
pub mod state;
pub mod synthesis;
pub mod timeline;
pub mod triggers;

pub use builder::OrchestratorBuilder;
pub use error::{EngineError, Result};
pub use gates::{ConfigChangeTimeout, ResearchDecision};
pub use navigation::{NavigationDecision, NavigationReason};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorHandle};
pub use reducer::{Effect, Reducer};
pub use resumption::{ResumeAction, SkipReason};
pub use router::{NextStep, RoundRouter, Router};
pub use sequencer::ParticipantStep;
pub use state::{RoundState, ScreenMode};
pub use synthesis::SynthesisStep;
pub use timeline::TimelineItem;
pub use triggers::{Subsystem, TriggerLedger};

pub use roundtable_types::{Command, EngineConfig, RoundEvent, TimeoutPolicy};
