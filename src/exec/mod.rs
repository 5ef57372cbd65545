// src/exec/mod.rs

//! Workload execution layer.
//!
//! - [`backend`] provides the `RuntimeExecutor` trait the engine depends on.
//! - [`process`] implements it with local shell processes (`ProcessExecutor`).
//! - [`task_runner`] spawns and supervises a single unit process.

pub mod backend;
pub mod process;
pub mod task_runner;

pub use backend::{ExecFuture, RuntimeExecutor};
pub use process::ProcessExecutor;
