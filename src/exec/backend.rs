// src/exec/backend.rs

//! Pluggable runtime executor abstraction.
//!
//! The engine talks to a `RuntimeExecutor` instead of spawning processes
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`ProcessExecutor`].
//!
//! - `ProcessExecutor` runs each task unit as a local shell process.
//! - Tests can provide their own `RuntimeExecutor` that scripts the observed
//!   status and records start/stop calls.
//!
//! [`ProcessExecutor`]: super::ProcessExecutor

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::task::{Task, TaskStatus};

/// Boxed future returned by executor operations.
pub type ExecFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait abstracting how a task's workload is started, observed and stopped.
///
/// Implementations must be safe to call concurrently: the engine inspects
/// under its lock but runs `stop` from a detached task.
pub trait RuntimeExecutor: Send + Sync + 'static {
    /// Begin executing the task's spec. Called once per created task.
    fn start<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()>;

    /// Return the currently observed status without side effects.
    ///
    /// A workload that vanished is reported as `TaskState::NotFound` rather
    /// than as an error.
    fn inspect<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, TaskStatus>;

    /// Request termination. May be slow.
    fn stop<'a>(&'a self, task: &'a Task) -> ExecFuture<'a, ()>;

    /// Forget a task the engine has finalized. The default keeps nothing,
    /// so there is nothing to drop.
    fn release<'a>(&'a self, _task: &'a Task) -> ExecFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
