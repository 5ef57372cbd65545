// src/engine/state.rs

//! Engine bookkeeping and the pure decisions made on every tick.
//!
//! Nothing in here performs IO or awaits; the async shell in
//! [`reconcile`](super::reconcile) feeds observations in and acts on the
//! answers.

use std::collections::HashMap;
use std::fmt;

use crate::errors::{Result, SandboxError};
use crate::task::{Task, TaskName, TaskState, TaskStatus};

/// Why the engine asked the executor to stop a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DeletionRequested,
    TimeoutExceeded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DeletionRequested => f.write_str("deletion requested"),
            StopReason::TimeoutExceeded => f.write_str("timeout exceeded"),
        }
    }
}

/// Identifies one stopping mark, so a late stop cannot clear a newer mark
/// for a task that was finalized and re-created under the same name.
pub type StopMark = u64;

/// Tracked tasks plus the names with an executor stop in flight.
///
/// Only the engine holds this, always behind its lock. Callers receive
/// clones via [`EngineState::snapshot`].
#[derive(Debug, Default)]
pub struct EngineState {
    pub(crate) tasks: HashMap<TaskName, Task>,
    pub(crate) stopping: HashMap<TaskName, StopMark>,
    next_mark: StopMark,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live scan of tasks holding an admission slot.
    pub fn count_active(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.counts_toward_admission())
            .count()
    }

    /// Fail if admitting one more task would exceed `limit`.
    pub fn check_admission(&self, limit: usize) -> Result<()> {
        let active = self.count_active();
        if active >= limit {
            return Err(SandboxError::AdmissionLimitExceeded { limit, active });
        }
        Ok(())
    }

    pub fn is_stopping(&self, name: &str) -> bool {
        self.stopping.contains_key(name)
    }

    /// Returns `None` if the name is already marked.
    pub fn mark_stopping(&mut self, name: &str) -> Option<StopMark> {
        if self.stopping.contains_key(name) {
            return None;
        }
        self.next_mark += 1;
        self.stopping.insert(name.to_string(), self.next_mark);
        Some(self.next_mark)
    }

    /// Drop whatever mark `name` carries. Used when the task is finalized.
    pub fn clear_stopping(&mut self, name: &str) {
        self.stopping.remove(name);
    }

    /// Drop the mark only if it is still `mark`. Returns whether it was.
    pub fn finish_stop(&mut self, name: &str, mark: StopMark) -> bool {
        if self.stopping.get(name) == Some(&mark) {
            self.stopping.remove(name);
            return true;
        }
        false
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }
}

/// Decide whether `task` must be stopped given a fresh observation.
///
/// Never returns a reason while a stop for the same task is in flight.
pub fn stop_reason(task: &Task, observed: &TaskStatus, stopping: bool) -> Option<StopReason> {
    if stopping {
        return None;
    }
    if task.is_deleted() && !observed.state.is_terminal() {
        return Some(StopReason::DeletionRequested);
    }
    if observed.state == TaskState::Timeout {
        return Some(StopReason::TimeoutExceeded);
    }
    None
}

/// A task is removed once it is both marked deleted and observed terminal.
pub fn should_finalize(task: &Task, observed: &TaskStatus) -> bool {
    task.is_deleted() && observed.state.is_terminal()
}
