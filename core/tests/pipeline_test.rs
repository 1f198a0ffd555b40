//! End-to-end batch runs against a stand-in `babeldoc` shell script.
//!
//! The script prints the kind of lines the real tool logs, then exits based on
//! the file name it was given: `*broken*` exits 2, `*slow*` hangs until killed,
//! `*forking*` waits on a background worker, anything else succeeds.
#![cfg(unix)]

use babel_toolbox_core::job::{BatchEvent, BatchRunner, JobStatus, RunOptions};
use babel_toolbox_core::process::TokioProcessRunner;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const FAKE_BABELDOC: &str = r#"#!/bin/sh
file=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--files" ]; then file="$2"; fi
  shift
done
echo "INFO:babeldoc.main:Loading ONNX model"
echo "{'stage': 'Parse Page Layout', 'overall_progress': 40.0}" 1>&2
case "$file" in
  *slow*) exec sleep 30 ;;
  *forking*) sleep 20 & wait ;;
  *broken*) echo "boom" 1>&2; exit 2 ;;
esac
echo "'overall_progress': 99.5"
exit 0
"#;

struct Fixture {
    dir: TempDir,
    program: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("babeldoc");
        std::fs::write(&program, FAKE_BABELDOC).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, program }
    }

    fn pdf(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        path
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            api_key: "sk-test".into(),
            program: self.program.to_string_lossy().to_string(),
            ..RunOptions::default()
        }
    }
}

fn job_status(runner: &BatchRunner<TokioProcessRunner>, path: &Path) -> JobStatus {
    runner
        .jobs()
        .into_iter()
        .find(|job| job.display_name() == path.file_name().unwrap().to_string_lossy())
        .map(|job| job.status)
        .unwrap()
}

#[tokio::test]
async fn runs_each_file_and_reconciles_exit_codes() {
    let fixture = Fixture::new();
    let good = fixture.pdf("paper.pdf");
    let broken = fixture.pdf("broken.pdf");

    let runner = BatchRunner::new(TokioProcessRunner::new());
    runner.add_files([good.clone(), broken.clone()]);

    let events = Mutex::new(Vec::new());
    let sink = |event: BatchEvent| events.lock().unwrap().push(event);
    let summary = runner.run(fixture.options(), &sink).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.stopped);

    let jobs = runner.jobs();
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].progress, 100.0);
    assert_eq!(jobs[1].status, JobStatus::Failed);
    assert_eq!(jobs[1].last_exit_code, Some(2));

    let transcript = runner.transcript();
    assert!(transcript.iter().any(|line| line == "boom"));
    assert!(transcript.iter().any(|line| line == "Process exited with code 0"));
    assert!(transcript.iter().any(|line| line == "Process exited with code 2"));

    let events = events.into_inner().unwrap();
    assert!(matches!(events.first(), Some(BatchEvent::RunStarted { total: 2 })));
    assert!(matches!(events.last(), Some(BatchEvent::RunFinished { .. })));
    let staged = events.iter().any(|event| match event {
        BatchEvent::JobUpdated { job } => job.status_message == "Parse Page Layout (40%)",
        _ => false,
    });
    assert!(staged);
}

#[tokio::test]
async fn failed_files_are_retried_on_the_next_run() {
    let fixture = Fixture::new();
    let broken = fixture.pdf("broken.pdf");
    let good = fixture.pdf("done.pdf");

    let runner = BatchRunner::new(TokioProcessRunner::new());
    runner.add_files([good.clone(), broken.clone()]);
    let first = runner.run(fixture.options(), &|_event: BatchEvent| {}).await.unwrap();
    assert_eq!((first.completed, first.failed), (1, 1));

    let second = runner.run(fixture.options(), &|_event: BatchEvent| {}).await.unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.failed, 1);
    assert_eq!(job_status(&runner, &good), JobStatus::Completed);
    assert_eq!(runner.jobs()[1].attempts, 2);
}

#[tokio::test]
async fn stop_kills_the_running_file_and_leaves_the_rest() {
    let fixture = Fixture::new();
    let slow = fixture.pdf("slow.pdf");
    let later = fixture.pdf("later.pdf");

    let runner = Arc::new(BatchRunner::new(TokioProcessRunner::new()));
    runner.add_files([slow.clone(), later.clone()]);

    let background = Arc::clone(&runner);
    let options = fixture.options();
    let handle =
        tokio::spawn(async move { background.run(options, &|_event: BatchEvent| {}).await });

    let started = tokio::time::timeout(Duration::from_secs(10), async {
        while runner.transcript().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "fake babeldoc never produced output");

    assert!(runner.stop());
    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run did not end after stop")
        .unwrap()
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(job_status(&runner, &slow), JobStatus::Failed);
    assert_eq!(job_status(&runner, &later), JobStatus::Pending);
    assert!(runner
        .transcript()
        .iter()
        .any(|line| line == "Process exited with code unknown"));
    assert!(!runner.is_running());
}

#[tokio::test]
async fn stop_ends_the_run_when_the_tool_has_forked_a_worker() {
    let fixture = Fixture::new();
    let forking = fixture.pdf("forking.pdf");
    let later = fixture.pdf("later.pdf");

    let runner = Arc::new(BatchRunner::new(TokioProcessRunner::new()));
    runner.add_files([forking.clone(), later.clone()]);

    let background = Arc::clone(&runner);
    let options = fixture.options();
    let handle =
        tokio::spawn(async move { background.run(options, &|_event: BatchEvent| {}).await });

    let started = tokio::time::timeout(Duration::from_secs(10), async {
        while runner.transcript().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "fake babeldoc never produced output");

    assert!(runner.stop());
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not end after stop")
        .unwrap()
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(job_status(&runner, &forking), JobStatus::Failed);
    assert_eq!(job_status(&runner, &later), JobStatus::Pending);
}

#[tokio::test]
async fn missing_program_fails_the_file() {
    let fixture = Fixture::new();
    let pdf = fixture.pdf("paper.pdf");

    let runner = BatchRunner::new(TokioProcessRunner::new());
    runner.add_files([pdf.clone()]);
    let options = RunOptions {
        program: fixture
            .dir
            .path()
            .join("not-installed")
            .to_string_lossy()
            .to_string(),
        ..fixture.options()
    };
    let summary = runner.run(options, &|_event: BatchEvent| {}).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(job_status(&runner, &pdf), JobStatus::Failed);
    assert!(runner.transcript()[0].contains("not-installed"));
}
