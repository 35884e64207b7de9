pub mod config;
pub mod events;
pub mod message;
pub mod records;
pub mod snapshot;
pub mod stream;
pub mod thread;

pub use config::{EngineConfig, TimeoutPolicy};
pub use events::{Command, RoundEvent};
pub use message::{FinishReason, Message, MessageRole};
pub use records::{
    ChangeRecord, ConfigChange, RecordStatus, ResearchRecord, ResearchResult, ResearchSource,
    RoundConfig, SynthesisRecord,
};
pub use snapshot::{StreamStatusEntry, ThreadSnapshot};
pub use stream::{StreamKey, StreamStatus, StreamTarget};
pub use thread::{roster, ChatMode, Participant, Thread};
