//! Conditions a round must clear before any participant may stream.
//!
//! The configuration-change block always comes first; the research gate is
//! only consulted once the round is no longer blocked by configuration.

pub mod config_change;
pub mod research;

pub use config_change::ConfigChangeTimeout;
pub use research::ResearchDecision;
