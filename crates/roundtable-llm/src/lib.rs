pub mod accumulator;
pub mod error;
pub mod streaming;
pub mod traits;

pub use accumulator::{StreamAccumulator, StreamOutcome};
pub use error::StreamError;
pub use streaming::{replay, replay_text, ChunkStream, StreamChunk};
pub use traits::{
    ModeratorClient, ParticipantClient, ParticipantRequest, RoundClient, SynthesisRequest,
};
