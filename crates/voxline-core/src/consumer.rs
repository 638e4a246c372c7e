use crate::chunk::StreamChunk;
use crate::engine::{InferenceEngine, SynthesisRequest};
use crate::error::JobError;
use crate::job::Job;
use crate::playback::{PlaybackOutcome, PlaybackRoute, PlaybackStrategy};
use futures::StreamExt;
use std::sync::Arc;

/// What happened to one job
#[derive(Debug)]
pub struct JobReport {
    pub job_id: u64,
    /// Playback outcome of every chunk handled, in stream order
    pub outcomes: Vec<PlaybackOutcome>,
    pub result: Result<(), JobError>,
}

impl JobReport {
    pub fn chunks(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Drives one job's chunk stream to completion, strictly in order
#[derive(Clone)]
pub struct StreamConsumer {
    engine: Arc<dyn InferenceEngine>,
    playback: Arc<PlaybackStrategy>,
}

impl StreamConsumer {
    pub fn new(engine: Arc<dyn InferenceEngine>, playback: Arc<PlaybackStrategy>) -> Self {
        Self { engine, playback }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub async fn consume(&self, job: &Job) -> JobReport {
        let request = SynthesisRequest {
            text: job.text().to_string(),
            params: job.params().clone(),
            stream_as_bytes: true,
        };

        let mut outcomes = Vec::new();
        let mut stream = match self.engine.synthesize(request).await {
            Ok(stream) => stream,
            Err(e) => {
                return JobReport {
                    job_id: job.id(),
                    outcomes,
                    result: Err(JobError::EngineConstruction(e)),
                };
            }
        };

        // The next chunk is only pulled once the current one finished playing
        while let Some(item) = stream.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    return JobReport {
                        job_id: job.id(),
                        result: Err(JobError::EngineStream {
                            chunks: outcomes.len(),
                            source: e,
                        }),
                        outcomes,
                    };
                }
            };

            let chunk = StreamChunk::interpret(raw);
            log::info!("[job {}] status: {}", job.id(), chunk.status);
            if let Some(model) = &chunk.model_identifier {
                log::debug!("[job {}] produced by {}", job.id(), model);
            }

            let outcome = self.playback.play(&chunk).await;
            if outcome != PlaybackOutcome::Played(PlaybackRoute::Memory)
                && let Some(path) = &chunk.audio_path
            {
                log::info!("[job {}] audio file: {}", job.id(), path.display());
            }
            if let PlaybackOutcome::Failed(reason) = &outcome {
                log::warn!("[job {}] chunk playback failed: {}", job.id(), reason);
            }
            outcomes.push(outcome);
        }

        JobReport {
            job_id: job.id(),
            outcomes,
            result: Ok(()),
        }
    }
}
