use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an inference engine while building or driving a chunk stream
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine failed before yielding anything
    #[error(
        "Engine failed to start synthesis: {0}\nEngine: {1}\nSuggestion: Check the model path and engine command"
    )]
    Construction(String, String),

    /// The chunk stream failed after it started
    #[error("Engine stream failed: {0}\nEngine: {1}")]
    Stream(String, String),

    /// IO error
    #[error("IO error during synthesis: {0}\nOperation: {1}")]
    Io(std::io::Error, String),

    /// Request could not be encoded for the engine
    #[error("Failed to encode synthesis request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Playback errors, always local to a single chunk
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to initialize audio output stream: {0}")]
    InitFailed(String),

    #[error("Audio thread is no longer running")]
    Disconnected,

    #[error("Player '{0}' exited with status {1}\nPath: {path}", path = .2.display())]
    PlayerExit(String, String, PathBuf),

    #[error("Failed to launch player '{0}': {1}")]
    Launch(String, std::io::Error),

    #[error("Playback backend panicked: {0}")]
    Panicked(String),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Terminal failure of a single job
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Engine construction failed, no audio played\n{0}")]
    EngineConstruction(#[source] EngineError),

    #[error("Engine stream failed after {chunks} chunk(s)\n{source}")]
    EngineStream {
        chunks: usize,
        #[source]
        source: EngineError,
    },

    #[error("Job processing panicked: {0}")]
    Panicked(String),
}

/// Session-level errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A runtime command or startup flag referenced a path that does not exist
    #[error("{0} not found: {path}", path = .1.display())]
    ResourceNotFound(&'static str, PathBuf),

    #[error("Failed to read operator input: {0}")]
    Input(#[from] std::io::Error),

    #[error("Failed to write session output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Worker task failed to join: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Render a caught panic payload as text
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
