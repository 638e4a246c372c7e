//! Chunk playback
//!
//! Two optional capabilities sit behind [`PlaybackStrategy::play`]: an in-memory PCM
//! player and a file-based player. Both are detected once at startup. For each chunk the
//! first applicable route wins:
//!
//! 1. raw samples + in-memory player, falling back to the file route if that fails
//! 2. audio path + file player
//! 3. nothing to play

use crate::chunk::StreamChunk;
use crate::error::{PlaybackError, PlaybackResult, panic_message};
use crate::types::PcmAudio;
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

mod command;
#[cfg(feature = "playback")]
mod device;

pub use command::CommandFilePlayer;
#[cfg(feature = "playback")]
pub use device::DevicePlayer;

/// Run-wide playback policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Return only after the chunk finished sounding; chunks never overlap
    #[default]
    Blocking,
    /// Return once playback started; a fast next chunk may overlap
    FireAndForget,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Blocking => write!(f, "blocking"),
            PlaybackMode::FireAndForget => write!(f, "fire-and-forget"),
        }
    }
}

impl FromStr for PlaybackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" | "sync" => Ok(PlaybackMode::Blocking),
            "fire-and-forget" | "async" => Ok(PlaybackMode::FireAndForget),
            other => Err(format!(
                "Unknown playback mode '{other}'. Use: blocking or fire-and-forget."
            )),
        }
    }
}

/// How a chunk ended up being played
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackRoute {
    Memory,
    File(PathBuf),
}

/// Result of playing one chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Played(PlaybackRoute),
    Skipped(String),
    Failed(String),
}

impl PlaybackOutcome {
    pub fn is_played(&self) -> bool {
        matches!(self, PlaybackOutcome::Played(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PlaybackOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PlaybackOutcome::Failed(_))
    }
}

/// Plays decoded PCM from memory
#[async_trait]
pub trait MemoryPlayer: Send + Sync {
    /// Play mono 24000 Hz 16-bit PCM; in blocking mode resolve once it finished sounding
    async fn play_pcm(&self, pcm: &PcmAudio, mode: PlaybackMode) -> PlaybackResult<()>;

    fn name(&self) -> &str;
}

/// Plays a rendered audio file by path
#[async_trait]
pub trait FilePlayer: Send + Sync {
    async fn play_file(&self, path: &Path, mode: PlaybackMode) -> PlaybackResult<()>;

    fn name(&self) -> &str;
}

/// Routes chunks to whichever players are available
#[derive(Clone)]
pub struct PlaybackStrategy {
    memory: Option<Arc<dyn MemoryPlayer>>,
    file: Option<Arc<dyn FilePlayer>>,
    mode: PlaybackMode,
}

impl fmt::Debug for PlaybackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackStrategy")
            .field("memory", &self.memory.as_ref().map(|p| p.name().to_string()))
            .field("file", &self.file.as_ref().map(|p| p.name().to_string()))
            .field("mode", &self.mode)
            .finish()
    }
}

impl PlaybackStrategy {
    pub fn new(
        memory: Option<Arc<dyn MemoryPlayer>>,
        file: Option<Arc<dyn FilePlayer>>,
        mode: PlaybackMode,
    ) -> Self {
        Self { memory, file, mode }
    }

    /// No players at all; every chunk is skipped
    pub fn silent(mode: PlaybackMode) -> Self {
        Self::new(None, None, mode)
    }

    /// Detect both players on this platform
    pub fn detect(mode: PlaybackMode) -> Self {
        let memory = detect_memory_player();
        let file = CommandFilePlayer::detect().map(|p| Arc::new(p) as Arc<dyn FilePlayer>);

        match &memory {
            Some(player) => log::info!("In-memory playback available ({})", player.name()),
            None => log::info!("In-memory playback unavailable"),
        }
        match &file {
            Some(player) => log::info!("File playback available ({})", player.name()),
            None => log::info!("File playback unavailable, audio paths will only be printed"),
        }

        Self::new(memory, file, mode)
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn has_memory_player(&self) -> bool {
        self.memory.is_some()
    }

    pub fn has_file_player(&self) -> bool {
        self.file.is_some()
    }

    /// Play one chunk. Never fails outward; problems come back as the outcome.
    pub async fn play(&self, chunk: &StreamChunk) -> PlaybackOutcome {
        let mut memory_failure = None;

        if let (Some(pcm), Some(player)) = (&chunk.raw_samples, &self.memory) {
            let attempt = AssertUnwindSafe(player.play_pcm(pcm, self.mode)).catch_unwind();
            match flatten(attempt.await) {
                Ok(()) => return PlaybackOutcome::Played(PlaybackRoute::Memory),
                Err(e) => {
                    log::warn!("{} playback failed: {}", player.name(), e);
                    memory_failure = Some(e.to_string());
                }
            }
        }

        let Some(path) = &chunk.audio_path else {
            return match memory_failure {
                Some(reason) => PlaybackOutcome::Failed(reason),
                None => PlaybackOutcome::Skipped("no audio in chunk".to_string()),
            };
        };

        let Some(player) = &self.file else {
            return match memory_failure {
                Some(reason) => PlaybackOutcome::Failed(reason),
                None => PlaybackOutcome::Skipped("no file player available".to_string()),
            };
        };

        let attempt = AssertUnwindSafe(player.play_file(path, self.mode)).catch_unwind();
        match flatten(attempt.await) {
            Ok(()) => PlaybackOutcome::Played(PlaybackRoute::File(path.clone())),
            Err(e) => {
                log::warn!("Could not play {}: {}", path.display(), e);
                PlaybackOutcome::Failed(e.to_string())
            }
        }
    }
}

fn flatten(
    result: Result<PlaybackResult<()>, Box<dyn std::any::Any + Send>>,
) -> PlaybackResult<()> {
    result.unwrap_or_else(|payload| Err(PlaybackError::Panicked(panic_message(payload))))
}

#[cfg(feature = "playback")]
fn detect_memory_player() -> Option<Arc<dyn MemoryPlayer>> {
    match DevicePlayer::try_new() {
        Ok(player) => Some(Arc::new(player)),
        Err(e) => {
            log::warn!("No audio device available: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "playback"))]
fn detect_memory_player() -> Option<Arc<dyn MemoryPlayer>> {
    None
}
