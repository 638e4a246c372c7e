use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use voxline_core::engine::{SubprocessEngine, ToneEngine};
use voxline_core::types::DEFAULT_OUTPUT_PATH;
use voxline_core::{
    InferenceEngine, LlmEngine, PlaybackMode, PlaybackStrategy, Session, SessionSettings,
    StreamConsumer, SynthesisParams, WorkerConfig,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Synthetic sine tones, no model required
    Tone,
    /// External model process speaking JSON lines on stdout
    Command,
}

#[derive(Parser, Debug)]
#[command(name = "voxline")]
#[command(about = "Interactive streaming TTS - type lines, hear them while you keep typing", long_about = None)]
struct Cli {
    /// Model directory handed to the engine
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// LLM backend used by the engine (hf or vllm)
    #[arg(long, default_value_t = LlmEngine::Hf)]
    llm: LlmEngine,

    /// Use the fp16 flow model
    #[arg(long)]
    fp16: bool,

    /// Base output path for generated audio
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Reference prompt wav; wins over --sample
    #[arg(long)]
    prompt_wav: Option<PathBuf>,

    /// Bundled sample name under <root>/example/audios
    #[arg(long)]
    sample: Option<String>,

    /// Install root holding the bundled samples
    #[arg(long, env = "VOXLINE_ROOT", default_value = ".")]
    root: PathBuf,

    #[arg(long, value_enum, default_value_t = EngineKind::Tone)]
    engine: EngineKind,

    /// Program to run for --engine command; extra arguments go after `--`
    #[arg(long)]
    engine_cmd: Option<String>,

    #[arg(last = true)]
    engine_args: Vec<String>,

    /// blocking or fire-and-forget
    #[arg(long, default_value_t = PlaybackMode::Blocking)]
    playback: PlaybackMode,

    /// Only print audio paths, never play
    #[arg(long, env = "NO_PLAY", value_parser = FalseyValueParser::new())]
    no_play: bool,

    #[arg(long, default_value_t = 42)]
    seed: i64,

    /// Worker dequeue timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,
}

impl Cli {
    fn engine(&self) -> Result<Arc<dyn InferenceEngine>> {
        match self.engine {
            EngineKind::Tone => {
                if self.engine_cmd.is_some() || !self.engine_args.is_empty() {
                    log::warn!("--engine-cmd and trailing arguments are ignored by the tone engine");
                }
                Ok(Arc::new(ToneEngine::default()))
            }
            EngineKind::Command => {
                let program = self
                    .engine_cmd
                    .clone()
                    .context("--engine command requires --engine-cmd PROGRAM")?;
                Ok(Arc::new(SubprocessEngine::new(
                    program,
                    self.engine_args.clone(),
                )))
            }
        }
    }

    fn playback(&self) -> PlaybackStrategy {
        if self.no_play {
            log::info!("playback disabled, audio paths will only be printed");
            PlaybackStrategy::silent(self.playback)
        } else {
            PlaybackStrategy::detect(self.playback)
        }
    }

    fn settings(&self) -> SessionSettings {
        let params = SynthesisParams {
            model_path: self.model_path.clone(),
            output_path: self.output.clone(),
            llm_engine: self.llm,
            use_fp16_flow: self.fp16,
            seed: self.seed,
            ..SynthesisParams::default()
        };
        SessionSettings {
            params,
            initial_sample: self.sample.clone(),
            initial_prompt: self.prompt_wav.clone(),
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(self.poll_ms.max(1)),
            },
            ..SessionSettings::with_root(&self.root)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let engine = cli.engine()?;
    log::info!("using {} engine, {} playback", engine.name(), cli.playback);

    let consumer = StreamConsumer::new(engine, Arc::new(cli.playback()));
    let session = Session::start(cli.settings(), consumer);
    let result = session
        .run_until(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            interrupted(),
        )
        .await
        .context("Session ended with an error");

    // Exit directly: a pending stdin read would otherwise keep the runtime from shutting down
    match result {
        Ok(stats) => {
            log::debug!("{} job(s) processed", stats.total());
            std::process::exit(0)
        }
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1)
        }
    }
}

/// Resolves on the first Ctrl-C; later ones are swallowed while the queue drains
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Ctrl-C received, finishing queued jobs"),
        Err(e) => {
            log::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["voxline"]).unwrap();
        assert_eq!(cli.engine, EngineKind::Tone);
        assert_eq!(cli.llm, LlmEngine::Hf);
        assert_eq!(cli.playback, PlaybackMode::Blocking);

        let settings = cli.settings();
        assert_eq!(settings.params.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(settings.params.seed, 42);
        assert_eq!(settings.worker.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_command_engine_with_trailing_args() {
        let cli = Cli::try_parse_from([
            "voxline",
            "--engine",
            "command",
            "--engine-cmd",
            "python3",
            "--llm",
            "vllm",
            "--playback",
            "fire-and-forget",
            "--",
            "bridge.py",
            "--device",
            "cuda",
        ])
        .unwrap();

        assert_eq!(cli.engine_args, vec!["bridge.py", "--device", "cuda"]);
        assert_eq!(cli.llm, LlmEngine::Vllm);
        assert_eq!(cli.playback, PlaybackMode::FireAndForget);
        assert_eq!(cli.engine().unwrap().name(), "python3");
    }

    #[test]
    fn test_command_engine_requires_program() {
        let cli = Cli::try_parse_from(["voxline", "--engine", "command"]).unwrap();
        assert!(cli.engine().is_err());
    }

    #[test]
    fn test_rejects_unknown_llm() {
        assert!(Cli::try_parse_from(["voxline", "--llm", "onnx"]).is_err());
    }
}
