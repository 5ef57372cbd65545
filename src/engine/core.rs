// src/engine/core.rs

//! Engine handle and the caller-facing operations.
//!
//! Create and Sync hold the write lock for their whole sequence
//! (validate → admit → persist → start → inspect → track), so admission is
//! decided against a consistent view even under concurrent callers.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::runtime::LoopHandle;
use crate::engine::state::EngineState;
use crate::engine::EngineOptions;
use crate::errors::{Result, SandboxError};
use crate::exec::RuntimeExecutor;
use crate::store::TaskStore;
use crate::task::{validate_task, Task, TaskName, TaskStatus};

/// Shared engine internals, also held by the loop and detached stop tasks.
pub(crate) struct EngineInner<E: RuntimeExecutor> {
    pub(crate) state: RwLock<EngineState>,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) executor: Arc<E>,
    pub(crate) options: EngineOptions,
}

/// The task lifecycle engine.
///
/// Cheap to clone; clones share the same tasks and background loop.
pub struct TaskEngine<E: RuntimeExecutor> {
    pub(crate) inner: Arc<EngineInner<E>>,
    pub(crate) lifecycle: Arc<Mutex<Option<LoopHandle>>>,
}

impl<E: RuntimeExecutor> Clone for TaskEngine<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<E: RuntimeExecutor> fmt::Debug for TaskEngine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEngine")
            .field("options", &self.inner.options)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

/// Result of a [`TaskEngine::sync`] call.
///
/// `tasks` is always the current tracked set, even when some entries failed.
#[derive(Debug)]
pub struct SyncOutcome {
    pub tasks: Vec<Task>,
    pub errors: Vec<SandboxError>,
}

impl SyncOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into a single result, joining every failure.
    pub fn into_result(self) -> Result<Vec<Task>> {
        if self.errors.is_empty() {
            Ok(self.tasks)
        } else {
            Err(SandboxError::Sync(self.errors))
        }
    }
}

impl<E: RuntimeExecutor> TaskEngine<E> {
    pub fn new(store: Arc<dyn TaskStore>, executor: Arc<E>, options: EngineOptions) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(EngineState::new()),
                store,
                executor,
                options,
            }),
            lifecycle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    /// Admit, persist and start a new task.
    pub async fn create(&self, task: Task) -> Result<Task> {
        let mut state = self.inner.state.write().await;
        self.inner.create_locked(&mut state, task).await
    }

    /// Converge the tracked set onto `desired`.
    ///
    /// Tracked tasks missing from `desired` are soft-deleted; desired tasks not
    /// yet tracked are created. Per-task failures are collected, never abort
    /// the call. Entries with an empty name are skipped; for duplicate names
    /// the first entry wins.
    pub async fn sync(&self, desired: Vec<Task>) -> SyncOutcome {
        let mut state = self.inner.state.write().await;
        let mut errors = Vec::new();

        let mut names: HashSet<TaskName> = HashSet::with_capacity(desired.len());
        let mut wanted = Vec::with_capacity(desired.len());
        for task in desired {
            if task.name.is_empty() {
                debug!("skipping desired task with empty name");
                continue;
            }
            if !names.insert(task.name.clone()) {
                warn!(task = %task.name, "duplicate name in desired set; keeping first entry");
                continue;
            }
            wanted.push(task);
        }

        let unwanted: Vec<TaskName> = state
            .tasks
            .keys()
            .filter(|name| !names.contains(*name))
            .cloned()
            .collect();
        for name in unwanted {
            if let Err(e) = self.inner.soft_delete_locked(&mut state, &name) {
                warn!(task = %name, error = %e, "sync: soft delete failed");
                errors.push(e);
            }
        }

        for task in wanted {
            if state.tasks.contains_key(&task.name) {
                continue;
            }
            let name = task.name.clone();
            if let Err(e) = self.inner.create_locked(&mut state, task).await {
                warn!(task = %name, error = %e, "sync: create failed");
                errors.push(e);
            }
        }

        info!(
            tracked = state.len(),
            failures = errors.len(),
            "sync complete"
        );

        SyncOutcome {
            tasks: state.snapshot(),
            errors,
        }
    }

    pub async fn get(&self, name: &str) -> Result<Task> {
        let state = self.inner.state.read().await;
        state
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::TaskNotFound(name.to_string()))
    }

    /// Unordered snapshot of every tracked task.
    pub async fn list(&self) -> Vec<Task> {
        self.inner.state.read().await.snapshot()
    }

    /// Mark a task for removal. The reconcile loop stops and removes it.
    ///
    /// Unknown names and already-deleted tasks are a no-op.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        self.inner.soft_delete_locked(&mut state, name)?;
        Ok(())
    }

    /// Names with an executor stop currently in flight.
    pub async fn stopping(&self) -> Vec<TaskName> {
        let state = self.inner.state.read().await;
        state.stopping.keys().cloned().collect()
    }
}

impl<E: RuntimeExecutor> EngineInner<E> {
    pub(crate) async fn create_locked(&self, state: &mut EngineState, task: Task) -> Result<Task> {
        validate_task(&task)?;

        if state.tasks.contains_key(&task.name) {
            return Err(SandboxError::AlreadyExists(task.name));
        }
        state.check_admission(self.options.admission_limit)?;

        // Status belongs to the engine and a new task is never born deleted.
        let mut task = Task {
            status: TaskStatus::default(),
            deletion_timestamp: None,
            ..task
        };

        self.store.create(&task).map_err(SandboxError::Store)?;

        if let Err(e) = self.executor.start(&task).await {
            warn!(task = %task.name, error = %e, "executor start failed; rolling back");
            if let Err(rollback) = self.store.delete(&task.name) {
                error!(task = %task.name, error = %rollback, "failed to roll back store record");
            }
            return Err(e);
        }

        // Populate a real status right away instead of returning a bare Pending.
        let mut tracked = task.clone();
        match self.executor.inspect(&task).await {
            Ok(status) => {
                task.status = status;
                match self.store.update(&task) {
                    Ok(()) => tracked.status = task.status.clone(),
                    Err(e) => warn!(
                        task = %task.name,
                        error = %e,
                        "failed to persist initial status; reconcile will retry"
                    ),
                }
            }
            Err(e) => warn!(
                task = %task.name,
                error = %e,
                "initial inspect failed; keeping pending status"
            ),
        }

        info!(task = %tracked.name, state = %tracked.status.state, "task created");
        state.tasks.insert(tracked.name.clone(), tracked.clone());
        Ok(tracked)
    }

    /// Returns `true` if the task was newly marked.
    pub(crate) fn soft_delete_locked(&self, state: &mut EngineState, name: &str) -> Result<bool> {
        let Some(task) = state.tasks.get(name) else {
            debug!(task = %name, "delete of unknown task is a no-op");
            return Ok(false);
        };
        if task.is_deleted() {
            return Ok(false);
        }

        let mut marked = task.clone();
        marked.deletion_timestamp = Some(SystemTime::now());
        self.store.update(&marked).map_err(SandboxError::Store)?;

        info!(task = %name, "task marked for deletion");
        state.tasks.insert(name.to_string(), marked);
        Ok(true)
    }
}
