//! Operator line protocol
//!
//! Every input line is one of: a quit word, a runtime command (`/sample`, `/prompt`),
//! an empty line, or text to speak. Text is turned into a [`Job`] carrying a snapshot
//! of the current [`SessionConfig`] and queued for the background worker.

use crate::consumer::{JobReport, StreamConsumer};
use crate::error::{SessionError, SessionResult};
use crate::job::Job;
use crate::queue::JobQueue;
use crate::types::SynthesisParams;
use crate::worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Bundled reference samples, relative to the install root
pub const SAMPLES_SUBDIR: &str = "example/audios";

const QUIT_WORDS: &[&str] = &["/quit", "/q", "quit", "exit"];
const SAMPLE_COMMAND: &str = "/sample";
const PROMPT_COMMAND: &str = "/prompt";

const BANNER: &str = "Interactive streaming CLI. Type lines (Enter to queue). Type /quit or /q to exit.\n\
Runtime commands: /sample <path|name> to change reference sample, /prompt <path> to set prompt wav\n";

/// Mutable per-session state, copied into each job at enqueue time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub prompt_reference: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Template for every job's parameters; `prompt_reference` is overwritten per job
    pub params: SynthesisParams,
    pub samples_dir: PathBuf,
    /// Sample name from the command line, resolved against `samples_dir`
    pub initial_sample: Option<String>,
    /// Prompt path from the command line; wins over `initial_sample` when both exist
    pub initial_prompt: Option<PathBuf>,
    pub worker: WorkerConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            params: SynthesisParams::default(),
            samples_dir: PathBuf::from(SAMPLES_SUBDIR),
            initial_sample: None,
            initial_prompt: None,
            worker: WorkerConfig::default(),
        }
    }
}

impl SessionSettings {
    /// Settings with the samples directory placed under `root`
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            samples_dir: root.as_ref().join(SAMPLES_SUBDIR),
            ..Self::default()
        }
    }
}

/// One classified operator line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Quit,
    Sample(String),
    Prompt(String),
    /// A runtime command given without its argument
    MissingArgument(&'static str),
    Speak(String),
    Empty,
}

impl LineCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if QUIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w)) {
            return Self::Quit;
        }
        if let Some(arg) = command_argument(line, SAMPLE_COMMAND) {
            return if arg.is_empty() {
                Self::MissingArgument(SAMPLE_COMMAND)
            } else {
                Self::Sample(arg.to_string())
            };
        }
        if let Some(arg) = command_argument(line, PROMPT_COMMAND) {
            return if arg.is_empty() {
                Self::MissingArgument(PROMPT_COMMAND)
            } else {
                Self::Prompt(arg.to_string())
            };
        }
        Self::Speak(line.to_string())
    }
}

/// `Some(arg)` when `line` is `command` alone or `command` followed by whitespace
fn command_argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Result of handling one line
#[derive(Debug)]
pub enum LineAction {
    Queued(Job),
    PromptChanged(PathBuf),
    NotFound(SessionError),
    Usage(&'static str),
    Ignored,
    Quit,
}

/// Foreground side of the pipeline: owns the config, feeds the queue, shuts the worker down
pub struct Session {
    settings: SessionSettings,
    config: SessionConfig,
    queue: Arc<JobQueue>,
    worker: WorkerHandle,
    next_job_id: u64,
}

impl Session {
    /// Resolve startup prompt flags and spawn the worker. Must be called inside a tokio runtime.
    pub fn start(settings: SessionSettings, consumer: StreamConsumer) -> Self {
        Self::launch(settings, |queue, config| Worker::spawn(queue, consumer, config))
    }

    /// Like [`Session::start`], also returning the report of every job as it finishes
    pub fn start_reporting(
        settings: SessionSettings,
        consumer: StreamConsumer,
    ) -> (Self, mpsc::UnboundedReceiver<JobReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self::launch(settings, |queue, config| {
            Worker::spawn_reporting(queue, consumer, config, tx)
        });
        (session, rx)
    }

    fn launch(
        settings: SessionSettings,
        spawn: impl FnOnce(Arc<JobQueue>, WorkerConfig) -> WorkerHandle,
    ) -> Self {
        let config = initial_config(&settings);
        let queue = Arc::new(JobQueue::new());
        let worker = spawn(queue.clone(), settings.worker.clone());
        Self {
            settings,
            config,
            queue,
            worker,
            next_job_id: 1,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn handle_line(&mut self, line: &str) -> LineAction {
        match LineCommand::parse(line) {
            LineCommand::Empty => LineAction::Ignored,
            LineCommand::Quit => LineAction::Quit,
            LineCommand::MissingArgument(command) => LineAction::Usage(command),
            LineCommand::Sample(arg) => {
                match resolve_sample(&self.settings.samples_dir, &arg) {
                    Some(path) => self.set_prompt(path),
                    None => LineAction::NotFound(SessionError::ResourceNotFound(
                        "Sample",
                        PathBuf::from(arg),
                    )),
                }
            }
            LineCommand::Prompt(arg) => {
                let path = PathBuf::from(arg);
                if path.exists() {
                    self.set_prompt(path)
                } else {
                    LineAction::NotFound(SessionError::ResourceNotFound("Prompt wav", path))
                }
            }
            LineCommand::Speak(text) => {
                let mut params = self.settings.params.clone();
                params.prompt_reference = self.config.prompt_reference.clone();
                let job = Job::new(self.next_job_id, text, params);
                self.next_job_id += 1;
                self.queue.enqueue(job.clone());
                LineAction::Queued(job)
            }
        }
    }

    fn set_prompt(&mut self, path: PathBuf) -> LineAction {
        self.config.prompt_reference = Some(path.clone());
        LineAction::PromptChanged(path)
    }

    /// Run the line protocol on `input`, writing operator output to stdout
    pub async fn run<R>(self, input: R) -> SessionResult<WorkerStats>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_with_output(input, tokio::io::stdout()).await
    }

    /// Run until quit or end of input, then drain the queue and stop the worker
    pub async fn run_with_output<R, W>(self, input: R, output: W) -> SessionResult<WorkerStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.run_until(input, output, std::future::pending()).await
    }

    /// Like [`Session::run_with_output`], also ending input when `interrupt` resolves
    ///
    /// Operator output is best effort. Once a write fails nothing more is written, lines keep
    /// being read, and the queue is still drained before the write error is returned.
    pub async fn run_until<R, W, F>(
        mut self,
        input: R,
        output: W,
        interrupt: F,
    ) -> SessionResult<WorkerStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut output = OperatorOutput::new(output);
        let read_result = self.read_lines(input, &mut output, interrupt).await;
        if let Err(e) = &read_result {
            log::error!("{e}");
        }

        output
            .line(&format!(
                "Waiting for queued jobs to finish ({} not started yet)...",
                self.queue.len()
            ))
            .await;
        let stats = self.shutdown().await?;
        output.line("All jobs finished. Exiting.").await;

        read_result?;
        match output.into_error() {
            Some(e) => Err(SessionError::Output(e)),
            None => Ok(stats),
        }
    }

    async fn read_lines<R, W, F>(
        &mut self,
        input: R,
        output: &mut OperatorOutput<W>,
        interrupt: F,
    ) -> SessionResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        output.write(BANNER).await;
        let mut lines = input.lines();
        loop {
            output.write("> ").await;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = &mut interrupt => {
                    log::info!("interrupted, finishing queued jobs");
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            let message = match self.handle_line(&line) {
                LineAction::Quit => break,
                LineAction::Ignored => continue,
                LineAction::Queued(job) => format!("queued job {}: {}", job.id(), job.preview()),
                LineAction::PromptChanged(path) => {
                    format!("Set current prompt wav to: {}", path.display())
                }
                LineAction::NotFound(e) => {
                    log::warn!("{e}");
                    e.to_string()
                }
                LineAction::Usage(command) => {
                    format!("usage: {command} <{}>", usage_argument(command))
                }
            };
            output.line(&message).await;
        }
        Ok(())
    }

    /// Stop, wait for every queued job, then join the worker
    pub async fn shutdown(self) -> SessionResult<WorkerStats> {
        self.queue.request_stop();
        self.queue.drain().await;
        let stats = self.worker.join().await?;
        log::info!(
            "session closed: {} job(s) completed, {} failed",
            stats.completed,
            stats.failed
        );
        Ok(stats)
    }
}

/// Operator-facing writer that stops writing after the first failure
struct OperatorOutput<W> {
    inner: W,
    error: Option<std::io::Error>,
}

impl<W: AsyncWrite + Unpin> OperatorOutput<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    async fn write(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        let inner = &mut self.inner;
        let result = async {
            inner.write_all(text.as_bytes()).await?;
            inner.flush().await
        }
        .await;
        if let Err(e) = result {
            log::warn!("operator output unavailable: {e}");
            self.error = Some(e);
        }
    }

    async fn line(&mut self, text: &str) {
        self.write(&format!("{text}\n")).await;
    }

    fn into_error(self) -> Option<std::io::Error> {
        self.error
    }
}

fn usage_argument(command: &str) -> &'static str {
    if command == SAMPLE_COMMAND {
        "name-or-path"
    } else {
        "path"
    }
}

/// Samples directory first, then `arg` as a literal path
fn resolve_sample(samples_dir: &Path, arg: &str) -> Option<PathBuf> {
    let bundled = samples_dir.join(arg);
    if bundled.exists() {
        return Some(bundled);
    }
    let literal = PathBuf::from(arg);
    literal.exists().then_some(literal)
}

fn initial_config(settings: &SessionSettings) -> SessionConfig {
    let mut config = SessionConfig::default();
    if let Some(sample) = &settings.initial_sample {
        let path = settings.samples_dir.join(sample);
        if path.exists() {
            config.prompt_reference = Some(path);
        } else {
            log::warn!("sample not found: {}", path.display());
        }
    }
    if let Some(prompt) = &settings.initial_prompt {
        if prompt.exists() {
            config.prompt_reference = Some(prompt.clone());
        } else {
            log::warn!("prompt wav not found: {}", prompt.display());
        }
    }
    config
}
