use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// A piece of a participant or moderator stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Message {
        content: String,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

impl StreamChunk {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    pub fn done(finish_reason: impl Into<String>) -> Self {
        Self::Done {
            finish_reason: Some(finish_reason.into()),
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Replay a fixed list of chunks, optionally pacing them.
///
/// Used by in-process collaborators and tests that need a stream shaped like a
/// provider's without a transport behind it.
pub fn replay(chunks: Vec<Result<StreamChunk>>, pace: Option<Duration>) -> ChunkStream {
    Box::pin(async_stream::stream! {
        for chunk in chunks {
            if let Some(delay) = pace {
                tokio::time::sleep(delay).await;
            }
            yield chunk;
        }
    })
}

/// Split `text` into word-sized message chunks followed by `Done`
pub fn replay_text(text: &str, finish_reason: &str) -> ChunkStream {
    let mut chunks: Vec<Result<StreamChunk>> = text
        .split_inclusive(' ')
        .map(|word| Ok(StreamChunk::message(word)))
        .collect();
    chunks.push(Ok(StreamChunk::done(finish_reason)));
    replay(chunks, None)
}
