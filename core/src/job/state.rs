use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::progress::LogSignal;

pub const STATUS_WAITING: &str = "Waiting for translation";
pub const STATUS_PREPARING: &str = "Preparing...";
pub const STATUS_DONE: &str = "Translation complete";
pub const STATUS_FAILED: &str = "Translation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Translating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a run should (re)start this job.
    pub fn is_runnable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed)
    }
}

/// Lifecycle of one queued PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    id: String,
    path: PathBuf,
    display_name: String,
    pub status: JobStatus,
    pub progress: f64,
    pub status_message: String,
    #[serde(default)]
    pub last_exit_code: Option<i32>,
    #[serde(default)]
    pub attempts: u32,
}

impl TranslationJob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = absolutize(path.into());
        let display_name = display_name_for(&path);
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            display_name,
            status: JobStatus::Pending,
            progress: 0.0,
            status_message: STATUS_WAITING.to_string(),
            last_exit_code: None,
            attempts: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Enter `Translating` for a fresh attempt.
    pub fn begin_attempt(&mut self) {
        self.status = JobStatus::Translating;
        self.progress = 0.0;
        self.status_message = STATUS_PREPARING.to_string();
        self.last_exit_code = None;
        self.attempts += 1;
    }

    /// Apply a recovered signal. Fields the signal does not carry are left as is.
    ///
    /// Progress is clamped into `[0, 100]` but regressions are accepted; the tool
    /// occasionally reports stages out of order.
    pub fn apply_signal(&mut self, signal: &LogSignal) -> bool {
        if self.status != JobStatus::Translating {
            return false;
        }

        let mut changed = false;
        if let Some(progress) = signal.progress {
            if progress.is_finite() {
                self.progress = progress.clamp(0.0, 100.0);
                changed = true;
            }
        }
        if let Some(status) = &signal.status {
            self.status_message = status.clone();
            changed = true;
        }
        changed
    }

    /// Reconcile the process exit code. Only a translating job can finish.
    pub fn finish(&mut self, exit_code: Option<i32>) -> bool {
        if self.status != JobStatus::Translating {
            return false;
        }

        self.last_exit_code = exit_code;
        if exit_code == Some(0) {
            self.status = JobStatus::Completed;
            self.progress = 100.0;
            self.status_message = STATUS_DONE.to_string();
        } else {
            self.status = JobStatus::Failed;
            self.status_message = STATUS_FAILED.to_string();
        }
        true
    }

    /// Mark a job that never got a process (spawn failure) as failed.
    pub fn fail_with(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.status_message = message.into();
    }

    /// The directory babeldoc writes its output to.
    pub fn output_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.exists() {
        if let Ok(canonical) = dunce::canonicalize(&path) {
            return canonical;
        }
    }
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

fn display_name_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
