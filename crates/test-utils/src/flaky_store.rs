use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

use sandboxer::store::{MemoryTaskStore, TaskStore};
use sandboxer::task::Task;

/// A [`MemoryTaskStore`] whose writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryTaskStore,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fail_list: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record, bypassing failure injection.
    pub fn seed(&self, task: &Task) {
        self.inner.create(task).expect("seed task");
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .list()
            .expect("list")
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    pub fn record(&self, name: &str) -> Option<Task> {
        self.inner.get(name).expect("get")
    }
}

impl TaskStore for FlakyStore {
    fn create(&self, task: &Task) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("injected create failure for '{}'", task.name);
        }
        self.inner.create(task)
    }

    fn get(&self, name: &str) -> Result<Option<Task>> {
        self.inner.get(name)
    }

    fn update(&self, task: &Task) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            bail!("injected update failure for '{}'", task.name);
        }
        self.inner.update(task)
    }

    fn delete(&self, name: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            bail!("injected delete failure for '{name}'");
        }
        self.inner.delete(name)
    }

    fn list(&self) -> Result<Vec<Task>> {
        if self.fail_list.load(Ordering::SeqCst) {
            bail!("injected list failure");
        }
        self.inner.list()
    }
}
