// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};

use super::TaskStore;
use crate::task::Task;

#[derive(Debug, Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<Mutex<BTreeMap<String, Task>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Task>>> {
        self.tasks
            .lock()
            .map_err(|_| anyhow!("memory task store lock poisoned"))
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.lock()?;
        if tasks.contains_key(&task.name) {
            bail!("task '{}' already exists in store", task.name);
        }
        tasks.insert(task.name.clone(), task.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Task>> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.lock()?;
        match tasks.get_mut(&task.name) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => bail!("task '{}' not found in store", task.name),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.lock()?.remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Task>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
