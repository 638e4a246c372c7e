//! # voxline core
//!
//! Job queue, worker lifecycle and streaming playback pipeline behind the `voxline`
//! interactive speech CLI.
//!
//! Operator lines become [`Job`]s, a single background [`Worker`] drains the [`JobQueue`]
//! and hands each job to the [`StreamConsumer`], which pulls chunks from an
//! [`InferenceEngine`] one at a time and routes every chunk through the
//! [`PlaybackStrategy`].
//!
//! ## Architecture
//!
//! - `InferenceEngine`: opaque speech model, produces a lazy stream of raw chunks
//! - `chunk`: decodes raw chunk shapes into a canonical [`StreamChunk`]
//! - `playback`: in-memory and file-based players behind a single `play` entry point
//! - `queue` / `worker`: FIFO job queue with drain support and its single consumer
//! - `session`: the line protocol and runtime commands
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxline_core::engine::ToneEngine;
//! use voxline_core::{PlaybackMode, PlaybackStrategy, Session, SessionSettings, StreamConsumer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let playback = PlaybackStrategy::detect(PlaybackMode::Blocking);
//!     let consumer = StreamConsumer::new(Arc::new(ToneEngine::default()), Arc::new(playback));
//!     let session = Session::start(SessionSettings::default(), consumer);
//!     session.run(tokio::io::BufReader::new(tokio::io::stdin())).await?;
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod job;
pub mod playback;
pub mod queue;
pub mod session;
pub mod types;
pub mod worker;

pub use chunk::{RawChunk, RawField, StreamChunk};
pub use consumer::{JobReport, StreamConsumer};
pub use engine::{ChunkStream, InferenceEngine, SynthesisRequest};
pub use error::{
    EngineError, EngineResult, JobError, PlaybackError, PlaybackResult, SessionError,
    SessionResult,
};
pub use job::Job;
pub use playback::{
    FilePlayer, MemoryPlayer, PlaybackMode, PlaybackOutcome, PlaybackRoute, PlaybackStrategy,
};
pub use queue::JobQueue;
pub use session::{LineAction, LineCommand, Session, SessionConfig, SessionSettings};
pub use types::{LlmEngine, PcmAudio, SynthesisParams};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};
