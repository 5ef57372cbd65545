// src/engine/mod.rs

//! Task lifecycle engine.
//!
//! The engine owns the authoritative in-memory view of every tracked task
//! and drives each one through its state machine:
//!
//! - admission control and the create / declarative sync paths ([`core`])
//! - pure bookkeeping and stop/finalize decisions ([`state`])
//! - the periodic reconcile tick and asynchronous stops ([`reconcile`])
//! - crash recovery and the background loop's start/stop ([`runtime`])
//!
//! One `tokio::sync::RwLock` guards the task map and the *stopping set*.
//! Mutations and the reconcile tick hold the write lock; `get`/`list` take
//! the read lock. Executor `stop` calls run outside the lock.

use std::time::Duration;

pub mod core;
pub mod reconcile;
pub mod runtime;
pub mod state;

pub use self::core::{SyncOutcome, TaskEngine};
pub use state::{should_finalize, stop_reason, EngineState, StopMark, StopReason};

/// Tunables for a [`TaskEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of simultaneously active tasks.
    pub admission_limit: usize,
    /// Delay between reconcile ticks.
    pub reconcile_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            admission_limit: 1,
            reconcile_interval: Duration::from_secs(1),
        }
    }
}
