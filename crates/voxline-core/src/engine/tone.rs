//! Synthetic engine that renders sine tones instead of speech
//!
//! Useful for exercising the queue and playback pipeline without a model. Each
//! sentence-like segment of the text becomes one chunk whose length follows the
//! segment length.

use super::{ChunkStream, InferenceEngine, SynthesisRequest};
use crate::chunk::RawChunk;
use crate::error::{EngineError, EngineResult};
use crate::types::{PCM_CHANNELS, PCM_SAMPLE_RATE, PcmAudio};
use async_trait::async_trait;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

const MODEL_ID: &str = "tone";

/// Tone engine configuration
#[derive(Debug, Clone)]
pub struct ToneEngine {
    /// Base frequency in Hz
    pub frequency: f32,
    /// Peak amplitude in [0.0, 1.0]
    pub amplitude: f32,
    /// Tone length per character of segment text
    pub ms_per_char: u32,
    pub min_chunk_ms: u32,
    pub max_chunk_ms: u32,
}

impl Default for ToneEngine {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.5,
            ms_per_char: 60,
            min_chunk_ms: 200,
            max_chunk_ms: 3000,
        }
    }
}

impl ToneEngine {
    fn render(&self, idx: usize, segment: &str) -> Vec<f32> {
        let chars = segment.chars().filter(|c| !c.is_whitespace()).count() as u32;
        let ms = (chars * self.ms_per_char).clamp(self.min_chunk_ms, self.max_chunk_ms);
        let len = (PCM_SAMPLE_RATE as u64 * ms as u64 / 1000) as usize;
        // Step through a short scale so consecutive chunks are audibly distinct
        let freq = self.frequency * 2f32.powf((idx % 4) as f32 * 2.0 / 12.0);

        (0..len)
            .map(|n| {
                let t = n as f32 / PCM_SAMPLE_RATE as f32;
                self.amplitude * (2.0 * PI * freq * t).sin()
            })
            .collect()
    }
}

#[async_trait]
impl InferenceEngine for ToneEngine {
    async fn synthesize(&self, request: SynthesisRequest) -> EngineResult<ChunkStream> {
        let segments = split_segments(&request.text);
        let engine = self.clone();
        let output_path = request.params.output_path.clone();
        let stream_as_bytes = request.stream_as_bytes;

        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Construction(
                    format!("cannot create output directory {}: {e}", parent.display()),
                    MODEL_ID.to_string(),
                )
            })?;
        }

        // Rendering stays at most one chunk ahead of playback
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        tokio::task::spawn_blocking(move || {
            let total = segments.len();
            for (idx, segment) in segments.iter().enumerate() {
                let samples = engine.render(idx, segment);
                let path = chunk_path(&output_path, idx);
                let item = write_wav(&path, &samples).map(|()| {
                    let status = format!("chunk {}/{}: {}", idx + 1, total, segment);
                    let path = path.to_string_lossy().into_owned();
                    if stream_as_bytes {
                        let pcm = PcmAudio::from_samples(&samples);
                        RawChunk::quad(status, Some(path), Some(MODEL_ID), Some(pcm.into_bytes()))
                    } else {
                        RawChunk::triple(status, Some(path), Some(MODEL_ID))
                    }
                });
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        MODEL_ID
    }
}

/// Split on sentence punctuation, dropping speaker tags and empty pieces
fn split_segments(text: &str) -> Vec<String> {
    text.split(|c: char| matches!(c, '.' | '!' | '?' | ';' | '\n' | '。' | '！' | '？' | '；'))
        .map(strip_speaker_tags)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn strip_speaker_tags(segment: &str) -> String {
    let mut rest = segment.trim_start();
    while crate::job::has_speaker_tag(rest) {
        rest = rest[4..].trim_start();
    }
    rest.to_string()
}

/// `outputs/x.wav` -> `outputs/x_chunk000.wav`
fn chunk_path(output_path: &Path, idx: usize) -> PathBuf {
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stream");
    output_path.with_file_name(format!("{stem}_chunk{idx:03}.wav"))
}

fn write_wav(path: &Path, samples: &[f32]) -> EngineResult<()> {
    let spec = hound::WavSpec {
        channels: PCM_CHANNELS,
        sample_rate: PCM_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_err = |e: hound::Error| {
        EngineError::Stream(
            format!("failed to write {}: {e}", path.display()),
            MODEL_ID.to_string(),
        )
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::StreamChunk;
    use crate::types::SynthesisParams;
    use futures::StreamExt;

    fn request(text: &str, output: PathBuf, stream_as_bytes: bool) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            params: SynthesisParams {
                output_path: output,
                ..SynthesisParams::default()
            },
            stream_as_bytes,
        }
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("[S1]Hello there. How are you?  "),
            vec!["Hello there".to_string(), "How are you".to_string()]
        );
        assert!(split_segments("[S1]").is_empty());
    }

    #[test]
    fn test_chunk_path() {
        assert_eq!(
            chunk_path(Path::new("outputs/cli_stream_output.wav"), 7),
            PathBuf::from("outputs/cli_stream_output_chunk007.wav")
        );
    }

    #[test]
    fn test_render_respects_bounds() {
        let engine = ToneEngine::default();
        let short = engine.render(0, "a");
        assert_eq!(short.len(), PCM_SAMPLE_RATE as usize / 5);
        assert!(short.iter().all(|s| s.abs() <= 0.5 + 1e-6));
        let long = engine.render(0, &"x".repeat(500));
        assert_eq!(long.len(), PCM_SAMPLE_RATE as usize * 3);
    }

    #[tokio::test]
    async fn test_streams_one_chunk_per_segment_with_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("out.wav");
        let engine = ToneEngine::default();

        let mut stream = engine
            .synthesize(request("[S1]One. Two!", output, true))
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            chunks.push(StreamChunk::interpret(item.unwrap()));
        }

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].status, "chunk 1/2: One");
        assert_eq!(chunks[0].model_identifier.as_deref(), Some("tone"));
        assert!(chunks[0].raw_samples.is_some());
        let path = chunks[1].audio_path.clone().unwrap();
        assert!(path.exists());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, PCM_SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
    }

    #[tokio::test]
    async fn test_without_bytes_yields_triples() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ToneEngine::default();
        let mut stream = engine
            .synthesize(request("hello", dir.path().join("o.wav"), false))
            .await
            .unwrap();

        let item = stream.next().await.unwrap().unwrap();
        assert!(matches!(&item, RawChunk::Tuple(fields) if fields.len() == 3));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_rendering_waits_for_the_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("o.wav");
        let engine = ToneEngine::default();
        let rendered = || {
            (0..6)
                .filter(|idx| chunk_path(&output, *idx).exists())
                .count()
        };

        let mut stream = engine
            .synthesize(request("A. B. C. D. E. F.", output.clone(), true))
            .await
            .unwrap();
        stream.next().await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        // The chunk in hand, one buffered and one blocked on send
        assert!(rendered() <= 3, "rendered {} chunks ahead", rendered());

        let mut rest = 0;
        while let Some(item) = stream.next().await {
            item.unwrap();
            rest += 1;
        }
        assert_eq!(rest, 5);
        assert_eq!(rendered(), 6);
    }
}
