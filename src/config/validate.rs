// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::engine::EngineOptions;
use crate::errors::{Result, SandboxError};
use crate::task::{validate_task, ContainerSpec, PodSpec, ProcessSpec, Task, TaskSpec};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SandboxError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let engine = validate_engine(&raw)?;
        let tasks = raw
            .task
            .iter()
            .map(|(name, cfg)| build_task(name, cfg))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConfigFile::new_unchecked(engine, raw.store, tasks))
    }
}

fn validate_engine(cfg: &RawConfigFile) -> Result<EngineOptions> {
    if cfg.engine.admission_limit == 0 {
        return Err(SandboxError::ConfigError(
            "[engine].admission_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    let interval = parse_duration(&cfg.engine.reconcile_interval).map_err(|e| {
        SandboxError::ConfigError(format!("[engine].reconcile_interval: {e}"))
    })?;
    if interval.is_zero() {
        return Err(SandboxError::ConfigError(
            "[engine].reconcile_interval must be greater than zero".to_string(),
        ));
    }

    Ok(EngineOptions {
        admission_limit: cfg.engine.admission_limit,
        reconcile_interval: interval,
    })
}

fn build_task(name: &str, cfg: &TaskConfig) -> Result<Task> {
    let timeout = cfg
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| SandboxError::ConfigError(format!("task '{}': timeout: {}", name, e)))?;

    let spec = match (&cfg.command, &cfg.containers) {
        (Some(command), None) => TaskSpec::Process(ProcessSpec {
            command: command.clone(),
            timeout,
        }),
        (None, Some(containers)) => TaskSpec::Pod(PodSpec {
            containers: containers
                .iter()
                .map(|c| ContainerSpec {
                    name: c.name.clone(),
                    command: c.command.clone(),
                })
                .collect(),
            timeout,
        }),
        (Some(_), Some(_)) => {
            return Err(SandboxError::ConfigError(format!(
                "task '{}' sets both `command` and `containers`",
                name
            )));
        }
        (None, None) => {
            return Err(SandboxError::ConfigError(format!(
                "task '{}' needs either `command` or `containers`",
                name
            )));
        }
    };

    let task = Task::new(name, spec);
    validate_task(&task).map_err(|e| match e {
        SandboxError::InvalidTask(msg) => SandboxError::ConfigError(msg),
        other => other,
    })?;
    Ok(task)
}
