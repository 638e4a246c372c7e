//! Inference engine boundary
//!
//! The speech model is opaque: given text and a parameter snapshot it produces a lazy
//! stream of raw chunks. Two engines ship with the crate, a subprocess bridge for real
//! models and a synthetic tone engine for smoke runs.

use crate::chunk::RawChunk;
use crate::error::EngineResult;
use crate::types::SynthesisParams;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

mod subprocess;
mod tone;

pub use subprocess::SubprocessEngine;
pub use tone::ToneEngine;

/// Lazy sequence of raw chunks for one job
pub type ChunkStream = Pin<Box<dyn Stream<Item = EngineResult<RawChunk>> + Send>>;

/// Synthesis request handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    /// Speaker-tagged text
    pub text: String,
    pub params: SynthesisParams,
    /// Ask the engine to attach raw PCM to each chunk
    pub stream_as_bytes: bool,
}

/// Trait for streaming speech synthesis
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Start synthesis and return the chunk stream
    ///
    /// An error here means nothing was produced; errors inside the stream mean the
    /// engine failed part way through.
    async fn synthesize(&self, request: SynthesisRequest) -> EngineResult<ChunkStream>;

    /// Engine name used in diagnostics
    fn name(&self) -> &str;
}
