// src/task/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{Result, SandboxError};
use crate::task::{Task, TaskSpec};

const MAX_NAME_LEN: usize = 63;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("name pattern is valid")
});

/// Check that `name` is a DNS-label style identifier.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SandboxError::InvalidTask("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SandboxError::InvalidTask(format!(
            "name '{}' is longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    if !NAME_RE.is_match(name) {
        return Err(SandboxError::InvalidTask(format!(
            "name '{}' must consist of lowercase alphanumerics or '-', \
             and start and end with an alphanumeric",
            name
        )));
    }
    Ok(())
}

/// Validate a task before it is admitted.
pub fn validate_task(task: &Task) -> Result<()> {
    validate_name(&task.name)?;

    match &task.spec {
        TaskSpec::Process(p) => {
            if p.command.trim().is_empty() {
                return Err(SandboxError::InvalidTask(format!(
                    "task '{}' has an empty command",
                    task.name
                )));
            }
        }
        TaskSpec::Pod(p) => {
            if p.containers.is_empty() {
                return Err(SandboxError::InvalidTask(format!(
                    "pod '{}' must have at least one container",
                    task.name
                )));
            }
            let mut seen = HashSet::new();
            for c in &p.containers {
                validate_name(&c.name).map_err(|e| {
                    SandboxError::InvalidTask(format!("pod '{}': container {}", task.name, e))
                })?;
                if !seen.insert(c.name.as_str()) {
                    return Err(SandboxError::InvalidTask(format!(
                        "pod '{}' has duplicate container '{}'",
                        task.name, c.name
                    )));
                }
                if c.command.trim().is_empty() {
                    return Err(SandboxError::InvalidTask(format!(
                        "pod '{}': container '{}' has an empty command",
                        task.name, c.name
                    )));
                }
            }
        }
    }

    Ok(())
}
