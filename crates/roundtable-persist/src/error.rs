use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Change record not found for round {round_number} of thread {thread_id}")]
    ChangeRecordNotFound { thread_id: String, round_number: u32 },

    #[error("Research not found for round {round_number} of thread {thread_id}")]
    ResearchNotFound { thread_id: String, round_number: u32 },

    #[error("Research failed: {0}")]
    ResearchFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;
