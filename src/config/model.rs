// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::task::Task;
use crate::types::StoreKind;

/// Validated manifest, ready to build an engine from.
///
/// Construct it with `ConfigFile::try_from(raw)` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineOptions,
    pub store: StoreSection,
    /// Declared tasks in name order; this is the desired set for `sync`.
    pub tasks: Vec<Task>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineOptions, store: StoreSection, tasks: Vec<Task>) -> Self {
        Self {
            engine,
            store,
            tasks,
        }
    }
}

/// Top-level manifest as read from a TOML file.
///
/// ```toml
/// [engine]
/// admission_limit = 2
/// reconcile_interval = "500ms"
///
/// [store]
/// kind = "file"
/// dir = ".sandboxer/tasks"
///
/// [task.hello]
/// command = "echo hello"
/// timeout = "10s"
///
/// [task.web]
/// containers = [
///   { name = "server", command = "python3 -m http.server 8080" },
/// ]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub store: StoreSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum number of simultaneously active tasks.
    #[serde(default = "default_admission_limit")]
    pub admission_limit: usize,

    /// Duration string between reconcile ticks, e.g. `"500ms"`.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,
}

fn default_admission_limit() -> usize {
    1
}

fn default_reconcile_interval() -> String {
    "1s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            admission_limit: default_admission_limit(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory for `kind = "file"`. Relative paths are resolved against
    /// the manifest's directory.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".sandboxer/tasks")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dir: default_store_dir(),
        }
    }
}

/// `[task.<name>]` section. Exactly one of `command` or `containers`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Shell command for a single-process task.
    #[serde(default)]
    pub command: Option<String>,

    /// Containers for a pod-like task.
    #[serde(default)]
    pub containers: Option<Vec<ContainerConfig>>,

    /// Optional duration string after which the task is stopped.
    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub name: String,
    pub command: String,
}
