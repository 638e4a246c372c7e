use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Sample rate of raw PCM chunks
pub const PCM_SAMPLE_RATE: u32 = 24000;
/// Raw PCM chunks are always mono
pub const PCM_CHANNELS: u16 = 1;
/// Raw PCM chunks are 16-bit signed little-endian
pub const PCM_BYTES_PER_SAMPLE: usize = 2;

/// Default base path for rendered audio
pub const DEFAULT_OUTPUT_PATH: &str = "outputs/cli_stream_output.wav";

/// Language-model engine used by the speech model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmEngine {
    #[default]
    Hf,
    Vllm,
}

impl fmt::Display for LlmEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmEngine::Hf => write!(f, "hf"),
            LlmEngine::Vllm => write!(f, "vllm"),
        }
    }
}

impl FromStr for LlmEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hf" => Ok(LlmEngine::Hf),
            "vllm" => Ok(LlmEngine::Vllm),
            other => Err(format!("Unknown LLM engine '{other}'. Use: hf or vllm.")),
        }
    }
}

/// Configuration snapshot attached to every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Local model directory
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Named model variant
    #[serde(default)]
    pub model_choice: Option<String>,

    /// Base path for rendered audio artifacts
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Reference audio used as speaker/style prompt
    #[serde(default)]
    pub prompt_reference: Option<PathBuf>,

    #[serde(default)]
    pub llm_engine: LlmEngine,

    /// Run the flow model in fp16
    #[serde(default)]
    pub use_fp16_flow: bool,

    #[serde(default = "default_seed")]
    pub seed: i64,
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

fn default_seed() -> i64 {
    42
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            model_path: None,
            model_choice: None,
            output_path: default_output_path(),
            prompt_reference: None,
            llm_engine: LlmEngine::default(),
            use_fp16_flow: false,
            seed: default_seed(),
        }
    }
}

/// Raw linear PCM: mono, 24000 Hz, 16-bit signed little-endian
#[derive(Clone, PartialEq, Eq)]
pub struct PcmAudio {
    bytes: Vec<u8>,
}

impl PcmAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encode normalized samples into 16-bit PCM
    pub fn from_samples(samples: &[f32]) -> Self {
        let bytes = samples
            .iter()
            .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
            .collect();
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() < PCM_BYTES_PER_SAMPLE
    }

    /// Number of whole samples; a trailing odd byte is ignored
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / PCM_BYTES_PER_SAMPLE
    }

    pub fn duration_ms(&self) -> u64 {
        (self.sample_count() as f64 / PCM_SAMPLE_RATE as f64 * 1000.0) as u64
    }

    /// Decode into samples normalized to [-1.0, 1.0]
    pub fn to_f32_samples(&self) -> Vec<f32> {
        self.bytes
            .chunks_exact(PCM_BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect()
    }
}

impl fmt::Debug for PcmAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmAudio")
            .field("bytes", &self.bytes.len())
            .field("duration_ms", &self.duration_ms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = SynthesisParams::default();
        assert_eq!(params.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(params.llm_engine, LlmEngine::Hf);
        assert_eq!(params.seed, 42);
        assert!(!params.use_fp16_flow);
        assert!(params.prompt_reference.is_none());
    }

    #[test]
    fn test_params_fill_defaults_when_deserialized() {
        let params: SynthesisParams = serde_json::from_str(r#"{"llm_engine":"vllm"}"#).unwrap();
        assert_eq!(params.llm_engine, LlmEngine::Vllm);
        assert_eq!(params.seed, 42);
        assert_eq!(params.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
    }

    #[test]
    fn test_llm_engine_parse() {
        assert_eq!("HF".parse::<LlmEngine>().unwrap(), LlmEngine::Hf);
        assert_eq!("vllm".parse::<LlmEngine>().unwrap(), LlmEngine::Vllm);
        assert!("onnx".parse::<LlmEngine>().is_err());
    }

    #[test]
    fn test_pcm_decode_little_endian() {
        // 0x4000 = 16384 -> 0.5, 0x8000 = -32768 -> -1.0, trailing byte dropped
        let pcm = PcmAudio::new(vec![0x00, 0x40, 0x00, 0x80, 0x7f]);
        assert_eq!(pcm.sample_count(), 2);
        assert_eq!(pcm.to_f32_samples(), vec![0.5, -1.0]);
    }

    #[test]
    fn test_pcm_duration() {
        let pcm = PcmAudio::new(vec![0; PCM_SAMPLE_RATE as usize * PCM_BYTES_PER_SAMPLE]);
        assert_eq!(pcm.duration_ms(), 1000);
        assert!(PcmAudio::new(vec![1]).is_empty());
    }
}
