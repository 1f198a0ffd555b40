use async_trait::async_trait;
use log::{debug, warn};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use super::{
    augmented_path, CommandSpec, KillHandle, OutputSource, ProcessError, ProcessEvent,
    ProcessRunner, RunningProcess,
};
use crate::encoding::{LineBuffer, OutputEncoding};

const READ_CHUNK: usize = 8 * 1024;
/// How long a killed process's pipes may keep delivering output.
const KILL_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Runs commands with `tokio::process`, one reader task per pipe.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    channel_capacity: usize,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, spec: &CommandSpec) -> Result<RunningProcess, ProcessError> {
        let search_path = augmented_path(std::env::var_os("PATH"), &spec.extra_search_paths)?;
        let program = resolve_program(&spec.program, &search_path);

        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .env("PATH", &search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!("spawned {} (pid {:?})", spec.display_line(), pid);

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let stdout_task = child.stdout.take().map(|pipe| {
            tokio::spawn(pump(pipe, OutputSource::Stdout, spec.encoding.clone(), tx.clone()))
        });
        let stderr_task = child.stderr.take().map(|pipe| {
            tokio::spawn(pump(pipe, OutputSource::Stderr, spec.encoding.clone(), tx.clone()))
        });

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (status, killed) = tokio::select! {
                status = child.wait() => (status, false),
                Ok(()) = &mut kill_rx => {
                    kill_tree(&mut child, pid).await;
                    (child.wait().await, true)
                }
            };

            // Drain both pipes before reporting the exit so it is the last event.
            // After a kill, a surviving grandchild may still hold them open.
            for mut task in [stdout_task, stderr_task].into_iter().flatten() {
                if killed {
                    if tokio::time::timeout(KILL_DRAIN_GRACE, &mut task).await.is_err() {
                        warn!("output of pid {:?} still open after kill, abandoning it", pid);
                        task.abort();
                    }
                } else if let Err(err) = task.await {
                    warn!("output reader for pid {:?} panicked: {}", pid, err);
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!("failed to wait for pid {:?}: {}", pid, err);
                    None
                }
            };
            debug!("pid {:?} exited with {:?}", pid, code);
            let _ = tx.send(ProcessEvent::Exit { code }).await;
        });

        Ok(RunningProcess {
            pid,
            events: rx,
            kill: KillHandle::new(kill_tx),
        })
    }
}

async fn pump<R>(
    mut reader: R,
    source: OutputSource,
    encoding: OutputEncoding,
    tx: mpsc::Sender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = encoding.new_decoder();
    let mut lines = LineBuffer::new();
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                let text = decoder.decode(&buffer[..read]);
                for line in lines.push(&text) {
                    // Keep draining even if nobody listens, so the child never blocks on a full pipe.
                    let _ = tx.send(ProcessEvent::Output { source, text: line }).await;
                }
            }
            Err(err) => {
                warn!("failed to read {:?} pipe: {}", source, err);
                break;
            }
        }
    }

    let tail = decoder.finish();
    let mut rest = lines.push(&tail);
    rest.extend(lines.finish());
    for line in rest {
        let _ = tx.send(ProcessEvent::Output { source, text: line }).await;
    }
}

/// Kill the child together with any workers it started.
#[cfg(unix)]
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(group) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        // The child leads its own process group, see `process_group(0)` at spawn.
        if unsafe { libc::killpg(group, libc::SIGKILL) } == 0 {
            return;
        }
        warn!(
            "failed to kill process group {}: {}",
            group,
            std::io::Error::last_os_error()
        );
    }
    if let Err(err) = child.start_kill() {
        warn!("failed to terminate pid {:?}: {}", pid, err);
    }
}

#[cfg(target_os = "windows")]
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        let status = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => return,
            Ok(status) => warn!("taskkill for pid {} exited with {}", pid, status),
            Err(err) => warn!("failed to run taskkill for pid {}: {}", pid, err),
        }
    }
    if let Err(err) = child.start_kill() {
        warn!("failed to terminate pid {:?}: {}", pid, err);
    }
}

/// Look the program up in `search_path` ourselves, since the lookup rules for a
/// modified child `PATH` differ between platforms.
fn resolve_program(program: &str, search_path: &OsStr) -> PathBuf {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.to_path_buf();
    }

    for dir in std::env::split_paths(search_path) {
        for name in executable_names(program) {
            let full = dir.join(&name);
            if full.is_file() {
                return full;
            }
        }
    }
    candidate.to_path_buf()
}

#[cfg(target_os = "windows")]
fn executable_names(program: &str) -> Vec<String> {
    if Path::new(program).extension().is_some() {
        return vec![program.to_string()];
    }
    ["exe", "cmd", "bat"]
        .iter()
        .map(|ext| format!("{program}.{ext}"))
        .collect()
}

#[cfg(not(target_os = "windows"))]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_string()]
}
