// src/exec/task_runner.rs

//! Single unit process runner.
//!
//! A unit is one shell command: the whole task for process specs, or one
//! container of a pod. Each unit gets a supervising Tokio task that owns the
//! child and records its [`SubStatus`] when it exits or is killed.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::task::SubStatus;

/// Exit code recorded for units killed by the executor (128 + SIGKILL).
pub const KILLED_EXIT_CODE: i32 = 137;

/// Why a unit is being killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Requested,
    DeadlineExceeded,
}

impl StopCause {
    fn reason(self) -> &'static str {
        match self {
            StopCause::Requested => "Killed",
            StopCause::DeadlineExceeded => "DeadlineExceeded",
        }
    }
}

/// Handle for a running (or finished) unit.
///
/// - `status` is shared with the supervisor, which fills in the exit details.
/// - `cancel` asks the supervisor to kill the child.
/// - `handle` is the Tokio task supervising the child.
#[derive(Debug)]
pub struct UnitHandle {
    pub name: String,
    pub status: Arc<Mutex<SubStatus>>,
    cancel: Option<oneshot::Sender<StopCause>>,
    handle: Option<JoinHandle<()>>,
}

impl UnitHandle {
    pub fn snapshot(&self) -> SubStatus {
        match self.status.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.snapshot().is_finished()
    }

    /// Send the kill request and hand back the supervisor to await.
    ///
    /// Returns `None` if the unit was already asked to stop.
    pub fn request_stop(&mut self, cause: StopCause) -> Option<JoinHandle<()>> {
        if let Some(cancel) = self.cancel.take() {
            if cancel.send(cause).is_err() {
                debug!(unit = %self.name, "unit already exited while stopping");
            }
        }
        self.handle.take()
    }
}

fn shell_command(command: &str) -> Command {
    // Build a shell command appropriate for the platform.
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Spawn one unit and its supervisor.
///
/// Fails only if the process itself cannot be spawned.
pub fn spawn_unit(task: &str, unit: &str, command: &str) -> Result<UnitHandle> {
    info!(task = %task, unit = %unit, cmd = %command, "starting unit process");

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}' unit '{}'", task, unit))?;

    let status = Arc::new(Mutex::new(SubStatus {
        name: unit.to_string(),
        reason: "Running".to_string(),
        started_at: Some(SystemTime::now()),
        ..SubStatus::default()
    }));

    drain_output(task, unit, &mut child, Arc::clone(&status));

    let pid = child.id();
    let (cancel_tx, cancel_rx) = oneshot::channel::<StopCause>();
    let handle = tokio::spawn(supervise(
        child,
        pid,
        Arc::clone(&status),
        cancel_rx,
        task.to_string(),
        unit.to_string(),
    ));

    Ok(UnitHandle {
        name: unit.to_string(),
        status,
        cancel: Some(cancel_tx),
        handle: Some(handle),
    })
}

/// Consume stdout/stderr so pipe buffers never fill. The last stderr line is
/// kept as the unit's status message.
fn drain_output(task: &str, unit: &str, child: &mut Child, status: Arc<Mutex<SubStatus>>) {
    if let Some(stdout) = child.stdout.take() {
        let task = task.to_string();
        let unit = unit.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, unit = %unit, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let task = task.to_string();
        let unit = unit.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, unit = %unit, "stderr: {}", line);
                if let Ok(mut s) = status.lock() {
                    s.message = line;
                }
            }
        });
    }
}

fn record(status: &Mutex<SubStatus>, exit_code: i32, reason: &str, message: Option<String>) {
    let mut s = match status.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    s.exit_code = Some(exit_code);
    s.reason = reason.to_string();
    if let Some(message) = message {
        s.message = message;
    }
    s.finished_at = Some(SystemTime::now());
}

/// Either the process exits on its own, or a stop request kills it.
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    status: Arc<Mutex<SubStatus>>,
    mut cancel_rx: oneshot::Receiver<StopCause>,
    task: String,
    unit: String,
) {
    tokio::select! {
        res = child.wait() => {
            match res {
                Ok(exit) => {
                    let code = exit.code().unwrap_or(-1);
                    let reason = if exit.success() { "Completed" } else { "Error" };
                    info!(task = %task, unit = %unit, exit_code = code, "unit process exited");
                    record(&status, code, reason, None);
                }
                Err(e) => {
                    warn!(task = %task, unit = %unit, error = %e, "failed waiting for unit process");
                    record(&status, -1, "WaitError", Some(e.to_string()));
                }
            }
        }

        cause = &mut cancel_rx => {
            // A dropped sender means the workload was discarded; kill anyway.
            let cause = cause.unwrap_or(StopCause::Requested);
            info!(task = %task, unit = %unit, ?cause, "stop requested; killing unit process");
            if let Err(e) = kill_unit(&mut child, pid).await {
                warn!(task = %task, unit = %unit, error = %e, "failed to kill unit process");
            }
            record(
                &status,
                KILLED_EXIT_CODE,
                cause.reason(),
                Some("terminated by executor".to_string()),
            );
        }
    }
}

/// Kill the unit and reap it. On unix the unit leads its own process group,
/// so the whole group is signalled and nothing it forked outlives it.
async fn kill_unit(child: &mut Child, pid: Option<u32>) -> std::io::Result<()> {
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: kill(2) has no memory-safety preconditions.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
            child.wait().await?;
            return Ok(());
        }
        debug!(pgid, "process group already gone; killing leader directly");
    }
    #[cfg(not(unix))]
    let _ = pid;

    child.kill().await
}
