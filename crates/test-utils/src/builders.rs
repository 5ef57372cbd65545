#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sandboxer::config::{
    ConfigFile, ContainerConfig, EngineSection, RawConfigFile, StoreSection, TaskConfig,
};
use sandboxer::engine::{EngineOptions, TaskEngine};
use sandboxer::types::StoreKind;

use crate::fake_executor::FakeExecutor;
use crate::flaky_store::FlakyStore;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                store: StoreSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn admission_limit(mut self, limit: usize) -> Self {
        self.config.engine.admission_limit = limit;
        self
    }

    pub fn reconcile_interval(mut self, interval: &str) -> Self {
        self.config.engine.reconcile_interval = interval.to_string();
        self
    }

    pub fn file_store(mut self, dir: &str) -> Self {
        self.config.store = StoreSection {
            kind: StoreKind::File,
            dir: dir.into(),
        };
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn command(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                command: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn pod() -> Self {
        Self {
            task: TaskConfig {
                containers: Some(Vec::new()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn container(mut self, name: &str, command: &str) -> Self {
        self.task
            .containers
            .get_or_insert_with(Vec::new)
            .push(ContainerConfig {
                name: name.to_string(),
                command: command.to_string(),
            });
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// An engine wired to a [`FakeExecutor`] and a [`FlakyStore`], with handles
/// to both so tests can script and observe them.
pub struct EngineHarness {
    pub engine: TaskEngine<FakeExecutor>,
    pub executor: Arc<FakeExecutor>,
    pub store: Arc<FlakyStore>,
}

pub struct HarnessBuilder {
    options: EngineOptions,
    store: Option<Arc<FlakyStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            options: EngineOptions {
                admission_limit: 1,
                reconcile_interval: Duration::from_millis(20),
            },
            store: None,
        }
    }

    pub fn admission_limit(mut self, limit: usize) -> Self {
        self.options.admission_limit = limit;
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.options.reconcile_interval = interval;
        self
    }

    /// Reuse an existing store, e.g. to simulate a restart.
    pub fn store(mut self, store: Arc<FlakyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> EngineHarness {
        let executor = Arc::new(FakeExecutor::new());
        let store = self.store.unwrap_or_else(|| Arc::new(FlakyStore::new()));
        let engine = TaskEngine::new(store.clone(), executor.clone(), self.options);
        EngineHarness {
            engine,
            executor,
            store,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
