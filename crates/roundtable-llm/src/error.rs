use roundtable_types::FinishReason;
use thiserror::Error;

/// Ways a participant or moderator stream can end badly
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open stream: {0}")]
    Open(String),

    #[error("stream interrupted after {received} bytes: {reason}")]
    Interrupted { received: usize, reason: String },

    #[error("model returned an empty response")]
    EmptyResponse,
}

impl StreamError {
    /// Finish reason recorded on the message the stream was filling
    pub fn finish_reason(&self) -> FinishReason {
        match self {
            StreamError::Open(_) | StreamError::Interrupted { .. } => FinishReason::Error,
            StreamError::EmptyResponse => FinishReason::Unknown,
        }
    }
}
