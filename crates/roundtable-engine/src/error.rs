use roundtable_persist::PersistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Orchestrator is no longer running")]
    Closed,

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, &'static str),

    #[error("Command not accepted: {0}")]
    Rejected(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
