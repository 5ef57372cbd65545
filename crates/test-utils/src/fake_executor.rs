use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::anyhow;
use tokio::sync::Semaphore;

use sandboxer::errors::SandboxError;
use sandboxer::exec::{ExecFuture, RuntimeExecutor};
use sandboxer::task::{SubStatus, Task, TaskState, TaskStatus};

#[derive(Debug, Default)]
struct Script {
    statuses: HashMap<String, TaskStatus>,
    started: Vec<String>,
    stopped: Vec<String>,
    stops_finished: usize,
    released: Vec<String>,
    fail_start: HashSet<String>,
    fail_inspect: HashSet<String>,
    fail_stop: HashSet<String>,
}

/// Holds back every stop that began while it was installed.
#[derive(Debug, Clone)]
pub struct StopGate(Arc<Semaphore>);

impl StopGate {
    pub fn release(&self) {
        self.0.close();
    }
}

/// A fake executor that:
/// - records which tasks were started, stopped and released
/// - reports whatever state the test scripted for each task
/// - on `stop`, optionally blocks until released, then reports `Failed`
///   with a finish time (like a killed process).
#[derive(Debug, Default)]
pub struct FakeExecutor {
    script: Mutex<Script>,
    stop_gate: Mutex<Option<Arc<Semaphore>>>,
}

pub fn status_with(state: TaskState) -> TaskStatus {
    let now = SystemTime::now();
    let finished = state.is_terminal().then_some(now);
    TaskStatus::new(
        state,
        vec![SubStatus {
            exit_code: match state {
                TaskState::Succeeded => Some(0),
                TaskState::Failed => Some(1),
                _ => None,
            },
            reason: state.to_string(),
            started_at: Some(now),
            finished_at: finished,
            ..SubStatus::default()
        }],
    )
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script what `inspect` reports for `name` from now on.
    pub fn set_state(&self, name: &str, state: TaskState) {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(name.to_string(), status_with(state));
    }

    /// Forget `name`, so `inspect` reports `NotFound`.
    pub fn vanish(&self, name: &str) {
        self.script.lock().unwrap().statuses.remove(name);
    }

    pub fn fail_start(&self, name: &str) {
        self.script.lock().unwrap().fail_start.insert(name.to_string());
    }

    pub fn fail_inspect(&self, name: &str, fail: bool) {
        let mut s = self.script.lock().unwrap();
        if fail {
            s.fail_inspect.insert(name.to_string());
        } else {
            s.fail_inspect.remove(name);
        }
    }

    pub fn fail_stop(&self, name: &str) {
        self.script.lock().unwrap().fail_stop.insert(name.to_string());
    }

    /// Make every subsequent `stop` block until [`FakeExecutor::release_stops`]
    /// or until the returned gate is released.
    pub fn hold_stops(&self) -> StopGate {
        let gate = Arc::new(Semaphore::new(0));
        *self.stop_gate.lock().unwrap() = Some(Arc::clone(&gate));
        StopGate(gate)
    }

    /// Let held and future stops complete.
    pub fn release_stops(&self) {
        if let Some(gate) = self.stop_gate.lock().unwrap().take() {
            gate.close();
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.script.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.script.lock().unwrap().stopped.clone()
    }

    /// Number of `stop` calls that have returned.
    pub fn stops_finished(&self) -> usize {
        self.script.lock().unwrap().stops_finished
    }

    pub fn released(&self) -> Vec<String> {
        self.script.lock().unwrap().released.clone()
    }

    pub fn stop_count(&self, name: &str) -> usize {
        self.stopped().iter().filter(|n| n.as_str() == name).count()
    }

    pub fn start_count(&self, name: &str) -> usize {
        self.started().iter().filter(|n| n.as_str() == name).count()
    }
}

impl RuntimeExecutor for FakeExecutor {
    fn start<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            let mut s = self.script.lock().unwrap();
            s.started.push(task.name.clone());
            if s.fail_start.contains(&task.name) {
                return Err(SandboxError::Executor(anyhow!(
                    "scripted start failure for '{}'",
                    task.name
                )));
            }
            s.statuses
                .insert(task.name.clone(), status_with(TaskState::Running));
            Ok(())
        })
    }

    fn inspect<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, TaskStatus> {
        Box::pin(async move {
            let s = self.script.lock().unwrap();
            if s.fail_inspect.contains(&task.name) {
                return Err(SandboxError::Executor(anyhow!(
                    "scripted inspect failure for '{}'",
                    task.name
                )));
            }
            Ok(s
                .statuses
                .get(&task.name)
                .cloned()
                .unwrap_or_else(TaskStatus::not_found))
        })
    }

    fn stop<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.script.lock().unwrap().stopped.push(task.name.clone());

            let gate = self.stop_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                // Closed semaphore == released.
                let _ = gate.acquire().await;
            }

            let mut s = self.script.lock().unwrap();
            s.stops_finished += 1;
            if s.fail_stop.contains(&task.name) {
                return Err(SandboxError::Executor(anyhow!(
                    "scripted stop failure for '{}'",
                    task.name
                )));
            }
            s.statuses
                .insert(task.name.clone(), status_with(TaskState::Failed));
            Ok(())
        })
    }

    fn release<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.script.lock().unwrap().released.push(task.name.clone());
            Ok(())
        })
    }
}
