// src/engine/runtime.rs

//! Engine lifecycle: crash recovery and the background reconcile loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::core::{EngineInner, TaskEngine};
use crate::errors::{Result, SandboxError};
use crate::exec::RuntimeExecutor;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Running reconcile loop: its private token and its task.
#[derive(Debug)]
pub(crate) struct LoopHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl<E: RuntimeExecutor> TaskEngine<E> {
    /// Rebuild the in-memory view from the store, then launch the reconcile
    /// loop. The loop exits on [`TaskEngine::stop`] or when `token` is
    /// cancelled.
    pub async fn start(&self, token: CancellationToken) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(SandboxError::AlreadyStarted);
        }

        let recovered = self.inner.recover().await?;
        info!(recovered, "engine recovery complete");

        let loop_token = token.child_token();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), loop_token.clone()));
        *lifecycle = Some(LoopHandle {
            token: loop_token,
            handle,
        });
        Ok(())
    }

    /// Signal the loop to exit and wait until it has.
    ///
    /// No tick is in flight once this returns. Executor stops already
    /// launched keep running in the background.
    pub async fn stop(&self) {
        let Some(running) = self.lifecycle.lock().await.take() else {
            debug!("engine stop requested but loop is not running");
            return;
        };
        running.token.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "reconcile loop ended abnormally");
        }
        info!("engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }
}

impl<E: RuntimeExecutor> EngineInner<E> {
    /// Inspect every stored task once and track it with the observed status.
    ///
    /// Tasks whose inspect fails are skipped; a store listing failure aborts.
    pub(crate) async fn recover(&self) -> Result<usize> {
        let stored = self.store.list().map_err(SandboxError::Store)?;
        let mut state = self.state.write().await;
        let mut recovered = 0;

        for mut task in stored {
            let observed = match self.executor.inspect(&task).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(task = %task.name, error = %e, "recovery inspect failed; skipping task");
                    continue;
                }
            };

            if task.status != observed {
                task.status = observed;
                if let Err(e) = self.store.update(&task) {
                    warn!(task = %task.name, error = %e, "failed to persist recovered status");
                }
            }

            debug!(task = %task.name, state = %task.status.state, "recovered task");
            state.tasks.insert(task.name.clone(), task);
            recovered += 1;
        }

        Ok(recovered)
    }
}

async fn run_loop<E: RuntimeExecutor>(inner: Arc<EngineInner<E>>, token: CancellationToken) {
    let period = inner.options.reconcile_interval.max(MIN_INTERVAL);
    info!(interval = ?period, "reconcile loop started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => inner.reconcile().await,
        }
    }

    info!("reconcile loop exited");
}
