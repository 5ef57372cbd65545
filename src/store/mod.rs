// src/store/mod.rs

//! Durable persistence of task records, keyed by task name.
//!
//! The engine only needs plain CRUD; any store that honours the contract on
//! [`TaskStore`] works:
//!
//! - [`MemoryTaskStore`] keeps records in process memory (tests, ephemeral runs).
//! - [`FileTaskStore`] writes one JSON document per task through a
//!   [`FileSystem`](crate::fs::FileSystem), so tasks survive a restart and are
//!   recovered by `TaskEngine::start`.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::fs::RealFileSystem;
use crate::task::Task;
use crate::types::StoreKind;

pub mod file;
pub mod memory;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;

/// CRUD contract the engine relies on. Implementations must be safe to call
/// from several tasks at once.
pub trait TaskStore: Send + Sync + Debug {
    /// Insert a new record. Fails if a record with the same name exists.
    fn create(&self, task: &Task) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<Task>>;
    /// Replace an existing record. Fails if the record is absent.
    fn update(&self, task: &Task) -> Result<()>;
    /// Remove a record. Succeeds if the record is already absent.
    fn delete(&self, name: &str) -> Result<()>;
    fn list(&self) -> Result<Vec<Task>>;
}

/// Build the store selected by `[store]` in the manifest.
pub fn build_store(kind: StoreKind, dir: impl Into<PathBuf>) -> Arc<dyn TaskStore> {
    match kind {
        StoreKind::File => Arc::new(FileTaskStore::new(dir, Arc::new(RealFileSystem))),
        StoreKind::Memory => Arc::new(MemoryTaskStore::new()),
    }
}
