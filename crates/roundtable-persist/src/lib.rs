pub mod builder;
pub mod dbs;
pub mod error;
pub mod models;
pub mod trait_client;

pub use builder::MemoryBackendBuilder;
pub use dbs::memory::client::{MemoryBackend, ResearchOutcome};
pub use error::{PersistError, Result};
pub use models::{ConfigUpdate, CreateThreadRequest};
pub use trait_client::{ChangeRecordService, ResearchService, StreamStatusStore, ThreadService};
