// src/task/mod.rs

//! Task data model.
//!
//! A [`Task`] pairs an immutable [`TaskSpec`] with a mutable [`TaskStatus`]
//! that only the engine writes. Everything here is plain data: it can be
//! cloned into snapshots for callers and serialized by the task store.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

pub mod validate;

pub use validate::{validate_name, validate_task};

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Observed lifecycle state of a task.
///
/// `Pending -> Running -> {Succeeded, Failed, Timeout}`. `NotFound` is
/// reported by the executor when the workload vanished. `Timeout` is not
/// terminal: the engine stops the workload and waits for `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Timeout,
    NotFound,
}

impl TaskState {
    /// No further transition happens from a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::NotFound
        )
    }

    /// States that occupy an admission slot.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Timeout => "timeout",
            TaskState::NotFound => "notfound",
        };
        f.write_str(s)
    }
}

/// Status snapshot of one executable unit (the process, or one container).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubStatus {
    /// Container name; empty for single-process tasks.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub started_at: Option<SystemTime>,
    /// `None` while the unit is still running.
    #[serde(default)]
    pub finished_at: Option<SystemTime>,
}

impl SubStatus {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default)]
    pub sub_statuses: Vec<SubStatus>,
}

impl TaskStatus {
    pub fn new(state: TaskState, sub_statuses: Vec<SubStatus>) -> Self {
        Self {
            state,
            sub_statuses,
        }
    }

    /// Status reported for a workload the executor does not know about.
    pub fn not_found() -> Self {
        Self::new(TaskState::NotFound, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub command: String,
    #[serde(default)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub timeout: Option<Duration>,
}

/// What a task runs. Exactly one of a single process or a pod of containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSpec {
    Process(ProcessSpec),
    Pod(PodSpec),
}

impl TaskSpec {
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            TaskSpec::Process(p) => p.timeout,
            TaskSpec::Pod(p) => p.timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: TaskName,
    pub spec: TaskSpec,
    #[serde(default)]
    pub status: TaskStatus,
    /// Once set, never cleared: the task is removed when it turns terminal.
    #[serde(default)]
    pub deletion_timestamp: Option<SystemTime>,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, spec: TaskSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            status: TaskStatus::default(),
            deletion_timestamp: None,
        }
    }

    /// Single-process task running `command` through the shell.
    pub fn process(name: impl Into<TaskName>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            TaskSpec::Process(ProcessSpec {
                command: command.into(),
                timeout: None,
            }),
        )
    }

    /// Pod-like task with one unit per `(container name, command)` pair.
    pub fn pod<I, N, C>(name: impl Into<TaskName>, containers: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let containers = containers
            .into_iter()
            .map(|(n, c)| ContainerSpec {
                name: n.into(),
                command: c.into(),
            })
            .collect();
        Self::new(
            name,
            TaskSpec::Pod(PodSpec {
                containers,
                timeout: None,
            }),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match &mut self.spec {
            TaskSpec::Process(p) => p.timeout = Some(timeout),
            TaskSpec::Pod(p) => p.timeout = Some(timeout),
        }
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether this task occupies an admission slot.
    pub fn counts_toward_admission(&self) -> bool {
        !self.is_deleted() && self.status.state.is_active()
    }
}
