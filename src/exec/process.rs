// src/exec/process.rs

//! Local process executor.
//!
//! Every task becomes a *workload* of one or more units (see
//! [`task_runner`](super::task_runner)). Workloads live only in this
//! process's memory, so after a restart previously started tasks are
//! reported as `NotFound`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::errors::{Result, SandboxError};
use crate::exec::backend::{ExecFuture, RuntimeExecutor};
use crate::exec::task_runner::{spawn_unit, StopCause, UnitHandle};
use crate::task::{SubStatus, Task, TaskSpec, TaskState, TaskStatus};

#[derive(Debug)]
struct Workload {
    started: Instant,
    timeout: Option<Duration>,
    units: Vec<UnitHandle>,
}

impl Workload {
    fn has_live_units(&self) -> bool {
        self.units.iter().any(|u| !u.is_finished())
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.timeout
            .is_some_and(|t| now.saturating_duration_since(self.started) >= t)
    }
}

/// Executor that runs task units as local shell processes.
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    workloads: Mutex<HashMap<String, Workload>>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Workload>>> {
        self.workloads
            .lock()
            .map_err(|_| SandboxError::Executor(anyhow!("process executor lock poisoned")))
    }

    fn start_sync(&self, task: &Task) -> Result<()> {
        let mut workloads = self.lock()?;

        if let Some(existing) = workloads.get(&task.name) {
            if existing.has_live_units() {
                debug!(task = %task.name, "workload already running; start is a no-op");
                return Ok(());
            }
            debug!(task = %task.name, "replacing finished workload");
        }

        let mut units: Vec<UnitHandle> = Vec::new();
        for (unit, command) in unit_commands(&task.spec) {
            match spawn_unit(&task.name, unit, command) {
                Ok(handle) => units.push(handle),
                Err(e) => {
                    // Tear down the units that did start; their supervisors
                    // finish on their own once the kill is delivered.
                    for mut started in units {
                        let _ = started.request_stop(StopCause::Requested);
                    }
                    return Err(SandboxError::Executor(e));
                }
            }
        }

        info!(task = %task.name, units = units.len(), "workload started");
        workloads.insert(
            task.name.clone(),
            Workload {
                started: Instant::now(),
                timeout: task.spec.timeout(),
                units,
            },
        );
        Ok(())
    }

    fn inspect_sync(&self, task: &Task) -> Result<TaskStatus> {
        let workloads = self.lock()?;
        let Some(workload) = workloads.get(&task.name) else {
            return Ok(TaskStatus::not_found());
        };

        let subs: Vec<SubStatus> = workload.units.iter().map(UnitHandle::snapshot).collect();
        let state = aggregate_state(&subs, workload.deadline_passed(Instant::now()));
        Ok(TaskStatus::new(state, subs))
    }

    async fn stop_async(&self, task: &Task) -> Result<()> {
        let handles = {
            let mut workloads = self.lock()?;
            let Some(workload) = workloads.get_mut(&task.name) else {
                debug!(task = %task.name, "stop for unknown workload; nothing to do");
                return Ok(());
            };
            let cause = if workload.deadline_passed(Instant::now()) {
                StopCause::DeadlineExceeded
            } else {
                StopCause::Requested
            };
            workload
                .units
                .iter_mut()
                .filter_map(|u| u.request_stop(cause))
                .collect::<Vec<_>>()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(task = %task.name, error = %e, "unit supervisor ended abnormally");
            }
        }
        info!(task = %task.name, "workload stopped");
        Ok(())
    }
}

impl ProcessExecutor {
    fn release_sync(&self, task: &Task) -> Result<()> {
        let mut workloads = self.lock()?;
        match workloads.get(&task.name) {
            Some(w) if w.has_live_units() => {
                warn!(task = %task.name, "release of a live workload; keeping it");
            }
            Some(_) => {
                workloads.remove(&task.name);
                debug!(task = %task.name, "workload released");
            }
            None => {}
        }
        Ok(())
    }
}

impl RuntimeExecutor for ProcessExecutor {
    fn start<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async move { self.start_sync(task) })
    }

    fn inspect<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, TaskStatus> {
        Box::pin(async move { self.inspect_sync(task) })
    }

    fn stop<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(self.stop_async(task))
    }

    fn release<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async move { self.release_sync(task) })
    }
}

/// `(unit name, command)` pairs for a spec. Process specs have one unnamed unit.
fn unit_commands(spec: &TaskSpec) -> Vec<(&str, &str)> {
    match spec {
        TaskSpec::Process(p) => vec![("", p.command.as_str())],
        TaskSpec::Pod(p) => p
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.command.as_str()))
            .collect(),
    }
}

/// Fold unit statuses into one task state.
///
/// Any live unit keeps the task `Running` (or `Timeout` past its deadline);
/// once every unit finished the task succeeded only if all exited with 0.
pub fn aggregate_state(subs: &[SubStatus], deadline_passed: bool) -> TaskState {
    if subs.is_empty() {
        return TaskState::Pending;
    }
    if subs.iter().any(|s| !s.is_finished()) {
        return if deadline_passed {
            TaskState::Timeout
        } else {
            TaskState::Running
        };
    }
    if subs.iter().all(|s| s.exit_code == Some(0)) {
        TaskState::Succeeded
    } else {
        TaskState::Failed
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::task_runner::KILLED_EXIT_CODE;
    use std::time::SystemTime;

    fn finished(code: i32) -> SubStatus {
        SubStatus {
            exit_code: Some(code),
            finished_at: Some(SystemTime::now()),
            ..SubStatus::default()
        }
    }

    #[test]
    fn aggregate_state_rules() {
        let running = SubStatus::default();
        assert_eq!(aggregate_state(&[], false), TaskState::Pending);
        assert_eq!(aggregate_state(&[running.clone(), finished(0)], false), TaskState::Running);
        assert_eq!(aggregate_state(&[running, finished(0)], true), TaskState::Timeout);
        assert_eq!(aggregate_state(&[finished(0), finished(0)], true), TaskState::Succeeded);
        assert_eq!(aggregate_state(&[finished(0), finished(2)], false), TaskState::Failed);
    }

    async fn wait_for_state(exec: &ProcessExecutor, task: &Task, want: TaskState) -> TaskStatus {
        for _ in 0..200 {
            let status = exec.inspect(task).await.unwrap();
            if status.state == want {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task '{}' never reached {want}", task.name);
    }

    #[tokio::test]
    async fn unknown_workload_is_not_found() {
        let exec = ProcessExecutor::new();
        let status = exec.inspect(&Task::process("ghost", "true")).await.unwrap();
        assert_eq!(status, TaskStatus::not_found());
        exec.stop(&Task::process("ghost", "true")).await.unwrap();
    }

    #[tokio::test]
    async fn process_exit_codes_map_to_states() {
        let exec = ProcessExecutor::new();
        let ok = Task::process("ok", "exit 0");
        let bad = Task::process("bad", "echo boom >&2; exit 3");
        exec.start(&ok).await.unwrap();
        exec.start(&bad).await.unwrap();

        let status = wait_for_state(&exec, &ok, TaskState::Succeeded).await;
        assert_eq!(status.sub_statuses[0].exit_code, Some(0));
        assert_eq!(status.sub_statuses[0].name, "");

        let status = wait_for_state(&exec, &bad, TaskState::Failed).await;
        assert_eq!(status.sub_statuses[0].exit_code, Some(3));
        assert_eq!(status.sub_statuses[0].reason, "Error");
        assert!(status.sub_statuses[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn stop_kills_running_workload() {
        let exec = ProcessExecutor::new();
        let task = Task::process("sleeper", "sleep 30");
        exec.start(&task).await.unwrap();
        assert_eq!(exec.inspect(&task).await.unwrap().state, TaskState::Running);

        // A second start while running is a no-op.
        exec.start(&task).await.unwrap();

        exec.stop(&task).await.unwrap();
        let status = exec.inspect(&task).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.sub_statuses[0].exit_code, Some(KILLED_EXIT_CODE));
        assert_eq!(status.sub_statuses[0].reason, "Killed");

        // Stopping twice is harmless.
        exec.stop(&task).await.unwrap();
    }

    #[tokio::test]
    async fn deadline_reports_timeout_then_failed_after_stop() {
        let exec = ProcessExecutor::new();
        let task = Task::process("slow", "sleep 30").with_timeout(Duration::from_millis(50));
        exec.start(&task).await.unwrap();

        wait_for_state(&exec, &task, TaskState::Timeout).await;
        exec.stop(&task).await.unwrap();

        let status = exec.inspect(&task).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.sub_statuses[0].reason, "DeadlineExceeded");
        assert!(status.sub_statuses[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn pod_reports_one_sub_status_per_container() {
        let exec = ProcessExecutor::new();
        let task = Task::pod("pod", [("first", "exit 0"), ("second", "exit 1")]);
        exec.start(&task).await.unwrap();

        let status = wait_for_state(&exec, &task, TaskState::Failed).await;
        let names: Vec<_> = status.sub_statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn stop_kills_grandchildren_too() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let exec = ProcessExecutor::new();
        let task = Task::process(
            "leak",
            format!("(sleep 1; touch '{}'); true", marker.display()),
        );
        exec.start(&task).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        exec.stop(&task).await.unwrap();
        assert_eq!(exec.inspect(&task).await.unwrap().state, TaskState::Failed);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "subshell outlived its stopped unit");
    }

    #[tokio::test]
    async fn released_workloads_are_dropped() {
        let exec = ProcessExecutor::new();
        let tasks: Vec<Task> = (0..20).map(|i| Task::process(format!("t{i}"), "true")).collect();
        for task in &tasks {
            exec.start(task).await.unwrap();
        }
        for task in &tasks {
            wait_for_state(&exec, task, TaskState::Succeeded).await;
            exec.release(task).await.unwrap();
        }
        assert_eq!(exec.workload_count(), 0);
        assert_eq!(exec.inspect(&tasks[0]).await.unwrap(), TaskStatus::not_found());

        // Unknown names are fine.
        exec.release(&Task::process("ghost", "true")).await.unwrap();
    }

    #[tokio::test]
    async fn release_keeps_live_workload() {
        let exec = ProcessExecutor::new();
        let task = Task::process("sleeper", "sleep 30");
        exec.start(&task).await.unwrap();

        exec.release(&task).await.unwrap();
        assert_eq!(exec.workload_count(), 1);

        exec.stop(&task).await.unwrap();
        exec.release(&task).await.unwrap();
        assert_eq!(exec.workload_count(), 0);
    }
}

#[cfg(test)]
impl ProcessExecutor {
    fn workload_count(&self) -> usize {
        self.workloads.lock().map(|w| w.len()).unwrap_or(0)
    }
}
