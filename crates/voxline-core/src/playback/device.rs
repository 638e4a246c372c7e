use super::{MemoryPlayer, PlaybackMode};
use crate::error::{PlaybackError, PlaybackResult};
use crate::types::{PCM_CHANNELS, PCM_SAMPLE_RATE, PcmAudio};
use async_trait::async_trait;
use rodio::{OutputStreamBuilder, Sink};
use std::sync::mpsc;
use tokio::sync::oneshot;

struct PlayCommand {
    samples: Vec<f32>,
    mode: PlaybackMode,
    done: oneshot::Sender<()>,
}

/// In-memory player on the default output device
///
/// The output stream lives on a dedicated audio thread; callers hand it samples
/// over a channel and await completion.
pub struct DevicePlayer {
    tx: mpsc::Sender<PlayCommand>,
}

impl DevicePlayer {
    /// Try to open the default output device
    pub fn try_new() -> PlaybackResult<Self> {
        let (tx, rx) = mpsc::channel::<PlayCommand>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        std::thread::Builder::new()
            .name("voxline-audio".to_string())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let sink = Sink::connect_new(stream.mixer());
                let _ = ready_tx.send(Ok(()));

                // Exits once every DevicePlayer handle is dropped
                while let Ok(command) = rx.recv() {
                    let source =
                        rodio::buffer::SamplesBuffer::new(PCM_CHANNELS, PCM_SAMPLE_RATE, command.samples);
                    match command.mode {
                        PlaybackMode::Blocking => {
                            sink.append(source);
                            sink.sleep_until_end();
                        }
                        PlaybackMode::FireAndForget => {
                            let detached = Sink::connect_new(stream.mixer());
                            detached.append(source);
                            detached.detach();
                        }
                    }
                    let _ = command.done.send(());
                }
            })
            .map_err(|e| PlaybackError::InitFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(e)) => Err(PlaybackError::InitFailed(e)),
            Err(_) => Err(PlaybackError::InitFailed(
                "audio thread exited during startup".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MemoryPlayer for DevicePlayer {
    async fn play_pcm(&self, pcm: &PcmAudio, mode: PlaybackMode) -> PlaybackResult<()> {
        let (done, finished) = oneshot::channel();
        self.tx
            .send(PlayCommand {
                samples: pcm.to_f32_samples(),
                mode,
                done,
            })
            .map_err(|_| PlaybackError::Disconnected)?;
        finished.await.map_err(|_| PlaybackError::Disconnected)
    }

    fn name(&self) -> &str {
        "rodio"
    }
}
