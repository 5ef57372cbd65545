// src/engine/reconcile.rs

//! One reconcile tick.
//!
//! For every tracked task, under the write lock:
//! 1. inspect it (a failure skips the task until the next tick);
//! 2. launch a detached executor stop if it is deleted-but-live or timed out;
//! 3. queue it for removal if it is deleted and terminal;
//! 4. persist the observed status if it changed and no stop is in flight.
//!
//! Queued removals are applied after the pass: the record is deleted, then
//! the executor is told to release the workload. Store failures leave the
//! task tracked so the next tick retries.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::core::{EngineInner, TaskEngine};
use crate::engine::state::{should_finalize, stop_reason, StopMark, StopReason};
use crate::exec::RuntimeExecutor;
use crate::task::{Task, TaskName};

impl<E: RuntimeExecutor> TaskEngine<E> {
    /// Run a single reconcile tick now.
    pub async fn reconcile(&self) {
        self.inner.reconcile().await;
    }
}

impl<E: RuntimeExecutor> EngineInner<E> {
    pub(crate) async fn reconcile(self: &Arc<Self>) {
        let mut state = self.state.write().await;

        let names: Vec<TaskName> = state.tasks.keys().cloned().collect();
        let mut finalize: Vec<TaskName> = Vec::new();

        for name in names {
            let Some(task) = state.tasks.get(&name).cloned() else {
                continue;
            };

            let observed = match self.executor.inspect(&task).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(task = %name, error = %e, "inspect failed; retrying next tick");
                    continue;
                }
            };

            if let Some(reason) = stop_reason(&task, &observed, state.is_stopping(&name)) {
                // Mark before spawning so the next tick cannot stop it again.
                if let Some(mark) = state.mark_stopping(&name) {
                    self.spawn_stop(task.clone(), reason, mark);
                }
            }

            if should_finalize(&task, &observed) {
                finalize.push(name.clone());
            }

            if state.is_stopping(&name) {
                debug!(task = %name, observed = %observed.state, "stop in flight; not applying status");
                continue;
            }
            if task.status == observed {
                continue;
            }

            let previous = task.status.state;
            let mut updated = task;
            updated.status = observed;
            match self.store.update(&updated) {
                Ok(()) => {
                    if previous != updated.status.state {
                        info!(task = %name, from = %previous, to = %updated.status.state, "task state changed");
                    }
                    state.tasks.insert(name, updated);
                }
                Err(e) => {
                    warn!(task = %name, error = %e, "failed to persist status; retrying next tick");
                }
            }
        }

        for name in finalize {
            match self.store.delete(&name) {
                Ok(()) => {
                    state.clear_stopping(&name);
                    if let Some(task) = state.tasks.remove(&name) {
                        if let Err(e) = self.executor.release(&task).await {
                            warn!(task = %name, error = %e, "executor release failed");
                        }
                    }
                    info!(task = %name, "task finalized");
                }
                Err(e) => {
                    warn!(task = %name, error = %e, "failed to delete task record; retrying next tick");
                }
            }
        }
    }

    /// Fire-and-forget executor stop. Clears its own stopping mark when done,
    /// whatever the outcome; a newer mark for the same name is left alone.
    fn spawn_stop(self: &Arc<Self>, task: Task, reason: StopReason, mark: StopMark) {
        info!(task = %task.name, %reason, "stopping task");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.executor.stop(&task).await {
                Ok(()) => debug!(task = %task.name, "executor stop returned"),
                Err(e) => warn!(task = %task.name, error = %e, "executor stop failed"),
            }
            if !inner.state.write().await.finish_stop(&task.name, mark) {
                debug!(task = %task.name, "stop finished after its task was finalized");
            }
        });
    }
}
