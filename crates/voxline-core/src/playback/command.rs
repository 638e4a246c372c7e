use super::{FilePlayer, PlaybackMode};
use crate::error::{PlaybackError, PlaybackResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Platform audio player invoked as an external command
#[derive(Debug, Clone)]
pub struct CommandFilePlayer {
    program: PathBuf,
    args: Vec<String>,
    /// Program takes the path inside a script instead of as a trailing argument
    embeds_path: bool,
}

struct Candidate {
    program: &'static str,
    args: &'static [&'static str],
    embeds_path: bool,
}

#[cfg(target_os = "macos")]
const CANDIDATES: &[Candidate] = &[Candidate {
    program: "afplay",
    args: &[],
    embeds_path: false,
}];

#[cfg(windows)]
const CANDIDATES: &[Candidate] = &[Candidate {
    program: "powershell",
    args: &["-NoProfile", "-NonInteractive", "-Command"],
    embeds_path: true,
}];

#[cfg(not(any(target_os = "macos", windows)))]
const CANDIDATES: &[Candidate] = &[
    Candidate {
        program: "paplay",
        args: &[],
        embeds_path: false,
    },
    Candidate {
        program: "aplay",
        args: &["-q"],
        embeds_path: false,
    },
    Candidate {
        program: "ffplay",
        args: &["-nodisp", "-autoexit", "-loglevel", "quiet"],
        embeds_path: false,
    },
];

impl CommandFilePlayer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            embeds_path: false,
        }
    }

    /// First platform player found on `PATH`
    pub fn detect() -> Option<Self> {
        let path_var = std::env::var_os("PATH")?;
        CANDIDATES.iter().find_map(|candidate| {
            find_on_path(&path_var, candidate.program).map(|program| Self {
                program,
                args: candidate.args.iter().map(|a| a.to_string()).collect(),
                embeds_path: candidate.embeds_path,
            })
        })
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.embeds_path {
            let escaped = path.display().to_string().replace('\'', "''");
            cmd.arg(format!(
                "(New-Object Media.SoundPlayer '{escaped}').PlaySync()"
            ));
        } else {
            cmd.arg(path);
        }
        cmd
    }

    fn label(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl FilePlayer for CommandFilePlayer {
    async fn play_file(&self, path: &Path, mode: PlaybackMode) -> PlaybackResult<()> {
        let mut cmd = self.command(path);
        match mode {
            PlaybackMode::Blocking => {
                let status = cmd
                    .status()
                    .await
                    .map_err(|e| PlaybackError::Launch(self.label(), e))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PlaybackError::PlayerExit(
                        self.label(),
                        status.to_string(),
                        path.to_path_buf(),
                    ))
                }
            }
            PlaybackMode::FireAndForget => {
                // The child keeps running after the handle is dropped
                cmd.spawn()
                    .map(drop)
                    .map_err(|e| PlaybackError::Launch(self.label(), e))
            }
        }
    }

    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file-player")
    }
}

fn find_on_path(path_var: &OsString, program: &str) -> Option<PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| {
        let exe = dir.join(program);
        if exe.is_file() {
            return Some(exe);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{program}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
