use std::time::Instant;

use roundtable_types::FinishReason;

use crate::error::StreamError;
use crate::streaming::StreamChunk;

/// Final shape of a drained stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub finish_reason: FinishReason,
    pub duration_ms: u64,
}

impl StreamOutcome {
    /// The model produced nothing at all
    pub fn is_empty_response(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Accumulates chunks of one stream.
///
/// A stream that ends without a `Done` chunk, or with no content, finishes as
/// `FinishReason::Unknown`.
pub struct StreamAccumulator {
    content: String,
    finish_reason: Option<FinishReason>,
    started_at: Instant,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            finish_reason: None,
            started_at: Instant::now(),
        }
    }

    /// Push a chunk; returns the text delta to forward, if any
    pub fn push(&mut self, chunk: StreamChunk) -> Option<String> {
        match chunk {
            StreamChunk::Message { content } => {
                if content.is_empty() || self.finish_reason.is_some() {
                    return None;
                }
                self.content.push_str(&content);
                Some(content)
            }
            StreamChunk::Done { finish_reason } => {
                if self.finish_reason.is_none() {
                    self.finish_reason = Some(
                        finish_reason
                            .as_deref()
                            .map(FinishReason::parse)
                            .unwrap_or(FinishReason::Stop),
                    );
                }
                None
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.finish_reason.is_some()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Error for a stream that broke off after what was accumulated so far
    pub fn interrupted(&self, reason: impl Into<String>) -> StreamError {
        StreamError::Interrupted {
            received: self.content.len(),
            reason: reason.into(),
        }
    }

    pub fn finish(self) -> StreamOutcome {
        let duration_ms = self.started_at.elapsed().as_millis() as u64;
        let finish_reason = if self.content.trim().is_empty() {
            FinishReason::Unknown
        } else {
            self.finish_reason.unwrap_or(FinishReason::Unknown)
        };

        StreamOutcome {
            content: self.content,
            finish_reason,
            duration_ms,
        }
    }
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
