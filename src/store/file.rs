// src/store/file.rs

//! File-backed task store: `<dir>/<name>.json` per task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use super::TaskStore;
use crate::fs::FileSystem;
use crate::task::Task;

const EXTENSION: &str = "json";

#[derive(Debug)]
pub struct FileTaskStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    // Serializes check-then-write sequences (create/update).
    write_lock: Mutex<()>,
}

impl FileTaskStore {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }

    fn write_task(&self, task: &Task) -> Result<()> {
        let path = self.path_for(&task.name);
        let body = serde_json::to_vec_pretty(task)
            .with_context(|| format!("serializing task '{}'", task.name))?;
        self.fs.write(&path, &body)?;
        debug!(task = %task.name, path = ?path, "wrote task record");
        Ok(())
    }

    fn read_task(&self, path: &Path) -> Result<Task> {
        let raw = self.fs.read_to_string(path)?;
        serde_json::from_str(&raw).with_context(|| format!("parsing task record {:?}", path))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow!("file task store lock poisoned"))
    }
}

impl TaskStore for FileTaskStore {
    fn create(&self, task: &Task) -> Result<()> {
        let _guard = self.guard()?;
        if self.fs.exists(&self.path_for(&task.name)) {
            bail!("task '{}' already exists in store", task.name);
        }
        self.write_task(task)
    }

    fn get(&self, name: &str) -> Result<Option<Task>> {
        let path = self.path_for(name);
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        self.read_task(&path).map(Some)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let _guard = self.guard()?;
        if !self.fs.exists(&self.path_for(&task.name)) {
            bail!("task '{}' not found in store", task.name);
        }
        self.write_task(task)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.guard()?;
        self.fs.remove_file(&self.path_for(name))
    }

    fn list(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for path in self.fs.read_dir(&self.dir)? {
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            tasks.push(self.read_task(&path)?);
        }
        Ok(tasks)
    }
}
