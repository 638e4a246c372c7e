//! Out-of-process engine bridge
//!
//! The model runs as a child process. It receives one JSON request line on stdin:
//!
//! ```text
//! {"text": "[S1]hello", "params": {...}, "stream_as_bytes": true}
//! ```
//!
//! and answers with one JSON value per stdout line. Arrays are chunk tuples
//! `[status, path, model, pcm_base64]`; anything else is passed on as a non-tuple item.

use super::{ChunkStream, InferenceEngine, SynthesisRequest};
use crate::chunk::{RawChunk, RawField};
use crate::error::{EngineError, EngineResult};
use crate::types::SynthesisParams;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Engine that streams chunks from a child process
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    program: String,
    args: Vec<String>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    text: &'a str,
    params: &'a SynthesisParams,
    stream_as_bytes: bool,
}

impl SubprocessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl InferenceEngine for SubprocessEngine {
    async fn synthesize(&self, request: SynthesisRequest) -> EngineResult<ChunkStream> {
        let payload = serde_json::to_string(&WireRequest {
            text: &request.text,
            params: &request.params,
            stream_as_bytes: request.stream_as_bytes,
        })?;

        let construction = |msg: String| EngineError::Construction(msg, self.program.clone());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| construction(format!("failed to launch: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| construction("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| construction("child stdout unavailable".to_string()))?;

        stdin
            .write_all(format!("{payload}\n").as_bytes())
            .await
            .map_err(|e| construction(format!("failed to send request: {e}")))?;
        drop(stdin);

        // One line in flight: a stalled consumer stalls the reader, and the pipe stalls the engine
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let program = self.program.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if tx.send(Ok(parse_line(&line))).await.is_err() {
                            // Consumer is gone; dropping the child kills it
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx
                            .send(Err(EngineError::Io(e, "reading engine output".into())))
                            .await;
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let _ = tx
                        .send(Err(EngineError::Stream(
                            format!("engine process exited with {status}"),
                            program,
                        )))
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(EngineError::Io(e, "waiting for engine process".into())))
                        .await;
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Map one stdout line onto a raw chunk
fn parse_line(line: &str) -> RawChunk {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Array(items)) => RawChunk::Tuple(
            items
                .into_iter()
                .enumerate()
                .map(|(idx, value)| to_field(idx, value))
                .collect(),
        ),
        Ok(Value::String(s)) => RawChunk::Value(s),
        Ok(other) => RawChunk::Value(other.to_string()),
        Err(_) => RawChunk::Value(line.to_string()),
    }
}

fn to_field(idx: usize, value: Value) -> RawField {
    match value {
        Value::Null => RawField::Null,
        // Fourth slot carries base64 PCM
        Value::String(s) if idx == 3 => base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map(RawField::Bytes)
            .unwrap_or(RawField::Text(s)),
        Value::String(s) => RawField::Text(s),
        other => RawField::Other(other.to_string()),
    }
}
