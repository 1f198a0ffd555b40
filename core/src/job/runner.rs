use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::list::{JobError, JobList};
use super::options::RunOptions;
use super::state::{JobStatus, TranslationJob, STATUS_FAILED};
use crate::process::{
    CommandSpec, KillHandle, OutputSource, ProcessEvent, ProcessRunner, RunningProcess,
};
use crate::progress::LogEventExtractor;

pub const RUN_FINISHED_MESSAGE: &str = "All files processed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Please add files first")]
    NoFiles,
    #[error("Please configure an API key first")]
    MissingApiKey,
    #[error("A translation run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted { total: usize },
    JobStarted { job: TranslationJob },
    JobUpdated { job: TranslationJob },
    #[serde(rename_all = "camelCase")]
    Log {
        job_id: String,
        source: OutputSource,
        line: String,
    },
    JobFinished { job: TranslationJob },
    RunFinished { summary: RunSummary },
}

/// Receiver of batch progress. The desktop shell forwards these to the webview.
pub trait BatchEventSink: Send + Sync {
    fn emit(&self, event: BatchEvent);
}

impl<F> BatchEventSink for F
where
    F: Fn(BatchEvent) + Send + Sync,
{
    fn emit(&self, event: BatchEvent) {
        self(event)
    }
}

/// Runs queued PDFs through the external CLI, strictly one at a time.
pub struct BatchRunner<R: ProcessRunner> {
    runner: R,
    extractor: LogEventExtractor,
    jobs: Mutex<JobList>,
    transcript: Mutex<Vec<String>>,
    current: Mutex<Option<KillHandle>>,
    running: AtomicBool,
    stopping: AtomicBool,
}

struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("recovering poisoned batch lock");
        poisoned.into_inner()
    })
}

impl<R: ProcessRunner> BatchRunner<R> {
    pub fn new(runner: R) -> Self {
        Self::with_extractor(runner, LogEventExtractor::default())
    }

    pub fn with_extractor(runner: R, extractor: LogEventExtractor) -> Self {
        Self {
            runner,
            extractor,
            jobs: Mutex::new(JobList::new()),
            transcript: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn add_files<I, P>(&self, paths: I) -> Vec<TranslationJob>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        lock(&self.jobs).add_paths(paths)
    }

    pub fn remove_job(&self, id: &str) -> Result<TranslationJob, JobError> {
        lock(&self.jobs).remove(id)
    }

    pub fn jobs(&self) -> Vec<TranslationJob> {
        lock(&self.jobs).snapshot()
    }

    pub fn transcript(&self) -> Vec<String> {
        lock(&self.transcript).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Hard stop: kill the in-flight process and end the run after it.
    /// Returns false when no run is active.
    pub fn stop(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.current).as_mut() {
            handle.kill();
        }
        true
    }

    pub async fn run(
        &self,
        options: RunOptions,
        sink: &dyn BatchEventSink,
    ) -> Result<RunSummary, BatchError> {
        if lock(&self.jobs).is_empty() {
            return Err(BatchError::NoFiles);
        }
        if !options.has_api_key() {
            return Err(BatchError::MissingApiKey);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BatchError::AlreadyRunning);
        }
        let _running = RunningFlag(&self.running);
        self.stopping.store(false, Ordering::SeqCst);
        lock(&self.transcript).clear();

        let ids = lock(&self.jobs).ids();
        info!("starting translation run over {} file(s)", ids.len());
        sink.emit(BatchEvent::RunStarted { total: ids.len() });

        let mut summary = RunSummary::default();
        for id in ids {
            if self.stopping.load(Ordering::SeqCst) {
                summary.stopped = true;
                break;
            }

            let started = {
                let mut jobs = lock(&self.jobs);
                match jobs.get_mut(&id) {
                    // Removed while an earlier job was running.
                    None => continue,
                    Some(job) if !job.status.is_runnable() => {
                        summary.skipped += 1;
                        continue;
                    }
                    Some(job) => {
                        job.begin_attempt();
                        job.clone()
                    }
                }
            };
            let spec = options.command_spec(started.path());
            sink.emit(BatchEvent::JobStarted { job: started });

            match self.run_job(&id, &spec, sink).await {
                JobStatus::Completed => summary.completed += 1,
                _ => summary.failed += 1,
            }
        }
        if self.stopping.load(Ordering::SeqCst) {
            summary.stopped = true;
        }

        info!(
            "translation run finished: {} completed, {} failed, {} skipped{}",
            summary.completed,
            summary.failed,
            summary.skipped,
            if summary.stopped { " (stopped)" } else { "" }
        );
        sink.emit(BatchEvent::RunFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    async fn run_job(&self, id: &str, spec: &CommandSpec, sink: &dyn BatchEventSink) -> JobStatus {
        debug!("launching {}", spec.display_line());
        let RunningProcess {
            pid,
            mut events,
            kill,
        } = match self.runner.spawn(spec).await {
            Ok(process) => process,
            Err(err) => {
                warn!("could not start translation for job {}: {}", id, err);
                self.push_transcript(err.to_string());
                return self.finish_job(id, sink, |job| {
                    job.fail_with(STATUS_FAILED);
                    true
                });
            }
        };
        debug!("job {} running as pid {:?}", id, pid);

        *lock(&self.current) = Some(kill);
        if self.stopping.load(Ordering::SeqCst) {
            if let Some(handle) = lock(&self.current).as_mut() {
                handle.kill();
            }
        }

        let mut exit_code = None;
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output { source, text } => {
                    self.push_transcript(text.clone());
                    let signal = self.extractor.extract(&text);
                    sink.emit(BatchEvent::Log {
                        job_id: id.to_string(),
                        source,
                        line: text,
                    });
                    if let Some(signal) = signal {
                        if let Some(job) = self.update_job(id, |job| job.apply_signal(&signal)) {
                            sink.emit(BatchEvent::JobUpdated { job });
                        }
                    }
                }
                ProcessEvent::Exit { code } => {
                    exit_code = code;
                    break;
                }
            }
        }
        lock(&self.current).take();

        let code_text = exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.push_transcript(format!("Process exited with code {}", code_text));
        self.finish_job(id, sink, |job| job.finish(exit_code))
    }

    fn finish_job<F>(&self, id: &str, sink: &dyn BatchEventSink, apply: F) -> JobStatus
    where
        F: FnOnce(&mut TranslationJob) -> bool,
    {
        match self.update_job(id, apply) {
            Some(job) => {
                info!("{}: {}", job.display_name(), job.status_message);
                let status = job.status;
                sink.emit(BatchEvent::JobFinished { job });
                status
            }
            None => JobStatus::Failed,
        }
    }

    fn update_job<F>(&self, id: &str, apply: F) -> Option<TranslationJob>
    where
        F: FnOnce(&mut TranslationJob) -> bool,
    {
        let mut jobs = lock(&self.jobs);
        let job = jobs.get_mut(id)?;
        if apply(job) {
            Some(job.clone())
        } else {
            None
        }
    }

    fn push_transcript(&self, line: String) {
        lock(&self.transcript).push(line);
    }
}
