//! Boundary to external processes.
//!
//! A [`ProcessRunner`] launches one command and hands back a channel of
//! [`ProcessEvent`]s. Output arrives decoded and split into lines; the channel
//! always ends with exactly one [`ProcessEvent::Exit`].

mod tokio_runner;

pub use tokio_runner::TokioProcessRunner;

use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::encoding::OutputEncoding;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid search path entry: {0}")]
    SearchPath(String),
}

/// Everything needed to launch one command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Directories appended to the inherited `PATH`.
    pub extra_search_paths: Vec<PathBuf>,
    pub encoding: OutputEncoding,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            extra_search_paths: Vec::new(),
            encoding: OutputEncoding::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Value of the argument following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    /// Command line for logs, with secret values masked.
    pub fn display_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push("********".into());
                mask_next = false;
                continue;
            }
            mask_next = arg.ends_with("-api-key");
            parts.push(arg.clone());
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { source: OutputSource, text: String },
    /// `None` when the process was terminated by a signal.
    Exit { code: Option<i32> },
}

/// Hard-stop handle for a running process.
#[derive(Debug)]
pub struct KillHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl KillHandle {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Request termination. Returns false when the process already finished
    /// or a kill was already requested.
    pub fn kill(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// A launched process.
pub struct RunningProcess {
    pub pid: Option<u32>,
    pub events: mpsc::Receiver<ProcessEvent>,
    pub kill: KillHandle,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &CommandSpec) -> Result<RunningProcess, ProcessError>;
}

/// `<home>/.local/bin`, where pip/pipx/uv install user scripts.
pub fn local_bin_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".local").join("bin"))
}

/// Join the inherited `PATH` with the extra directories, keeping inherited
/// entries first.
pub fn augmented_path(
    inherited: Option<OsString>,
    extra: &[PathBuf],
) -> Result<OsString, ProcessError> {
    let mut entries: Vec<PathBuf> = inherited
        .as_ref()
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();
    for dir in extra {
        if !entries.iter().any(|existing| existing == dir) {
            entries.push(dir.clone());
        }
    }
    std::env::join_paths(entries).map_err(|err| ProcessError::SearchPath(err.to_string()))
}
