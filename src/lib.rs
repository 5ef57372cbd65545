// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod store;
pub mod task;
pub mod types;
pub mod watch;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{SyncOutcome, TaskEngine};
use crate::errors::SandboxError;
use crate::exec::{ProcessExecutor, RuntimeExecutor};
use crate::store::build_store;
use crate::task::{Task, TaskState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading
/// - task store + process executor + engine
/// - the initial sync of declared tasks
/// - (optional) manifest watcher
/// - Ctrl-C handling and engine shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store_dir = resolve_store_dir(&config_path, &cfg.store.dir);
    info!(kind = ?cfg.store.kind, dir = ?store_dir, "opening task store");
    let store = build_store(cfg.store.kind, store_dir);

    let executor = Arc::new(ProcessExecutor::new());
    let engine = TaskEngine::new(store, executor, cfg.engine);

    // Ctrl-C → cancel everything bound to the shutdown token.
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; shutting down");
            token.cancel();
        });
    }

    engine.start(shutdown.clone()).await?;

    let outcome = if args.once {
        run_once(&engine, cfg.tasks, &shutdown).await
    } else {
        serve(&engine, cfg.tasks, &config_path, args.watch, &shutdown).await
    };

    engine.stop().await;
    outcome
}

/// Keep the declared tasks reconciled until shutdown.
///
/// Tasks rejected by the admission limit are retried on each reconcile
/// interval until they get a slot.
async fn serve<E: RuntimeExecutor>(
    engine: &TaskEngine<E>,
    mut desired: Vec<Task>,
    config_path: &Path,
    watch: bool,
    shutdown: &CancellationToken,
) -> Result<()> {
    let (_watcher, mut reloads) = if watch {
        let (handle, rx) = crate::watch::spawn_manifest_watcher(config_path)?;
        (Some(handle), Some(rx))
    } else {
        (None, None)
    };

    let mut pending = !report_sync(engine.sync(desired.clone()).await);
    let mut retry = tokio::time::interval(engine.options().reconcile_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(cfg) = recv_reload(&mut reloads) => {
                if cfg.engine != engine.options() {
                    warn!("[engine] settings changed; restart to apply them");
                }
                desired = cfg.tasks;
                pending = !report_sync(engine.sync(desired.clone()).await);
            }
            _ = retry.tick(), if pending => {
                debug!("retrying sync of tasks waiting for admission");
                pending = !report_sync(engine.sync(desired.clone()).await);
            }
        }
    }
    Ok(())
}

async fn recv_reload(rx: &mut Option<tokio::sync::mpsc::Receiver<ConfigFile>>) -> Option<ConfigFile> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run every declared task once (respecting the admission limit), print a
/// summary, then remove them all.
async fn run_once<E: RuntimeExecutor>(
    engine: &TaskEngine<E>,
    desired: Vec<Task>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let wanted: HashSet<String> = desired.iter().map(|t| t.name.clone()).collect();
    let mut admitted: HashSet<String> = HashSet::new();
    let interval = engine.options().reconcile_interval;

    let finished = loop {
        if admitted.len() < wanted.len() {
            let outcome = engine.sync(desired.clone()).await;
            admitted.extend(
                outcome
                    .tasks
                    .iter()
                    .filter(|t| wanted.contains(&t.name))
                    .map(|t| t.name.clone()),
            );
            for e in &outcome.errors {
                if !matches!(e, SandboxError::AdmissionLimitExceeded { .. }) {
                    bail!("failed to start declared tasks: {e}");
                }
            }
        }

        let tasks = engine.list().await;
        if admitted.len() >= wanted.len() && tasks.iter().all(|t| t.status.state.is_terminal()) {
            break tasks;
        }

        tokio::select! {
            _ = shutdown.cancelled() => bail!("interrupted before all tasks finished"),
            _ = tokio::time::sleep(interval) => {}
        }
    };

    print_summary(&finished);
    let failed = finished
        .iter()
        .filter(|t| t.status.state != TaskState::Succeeded)
        .count();

    report_sync(engine.sync(Vec::new()).await);
    while !engine.list().await.is_empty() {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    if failed > 0 {
        bail!("{failed} task(s) did not succeed");
    }
    Ok(())
}

/// Log a sync outcome; returns `true` if every entry was applied.
fn report_sync(outcome: SyncOutcome) -> bool {
    for e in &outcome.errors {
        match e {
            SandboxError::AdmissionLimitExceeded { .. } => debug!(error = %e, "task waiting for admission"),
            _ => warn!(error = %e, "sync error"),
        }
    }
    info!(
        tracked = outcome.tasks.len(),
        errors = outcome.errors.len(),
        "sync applied"
    );
    outcome.is_ok()
}

/// Resolve `[store].dir` relative to the manifest's directory.
///
/// - If the manifest path has a non-empty parent (e.g. "configs/Sandboxer.toml"),
///   relative store dirs live under that directory.
/// - For a bare filename we fall back to the current working directory.
fn resolve_store_dir(config_path: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    let root = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    root.join(dir)
}

fn print_summary(tasks: &[Task]) {
    let mut tasks: Vec<&Task> = tasks.iter().collect();
    tasks.sort_by(|a, b| a.name.cmp(&b.name));
    for task in tasks {
        let codes: Vec<String> = task
            .status
            .sub_statuses
            .iter()
            .map(|s| {
                let code = s
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());
                if s.name.is_empty() {
                    code
                } else {
                    format!("{}={}", s.name, code)
                }
            })
            .collect();
        println!("{:<24} {:<10} {}", task.name, task.status.state, codes.join(" "));
    }
}

/// Simple dry-run output: print engine settings and declared tasks.
fn print_dry_run(cfg: &ConfigFile) {
    println!("sandboxer dry-run");
    println!("  engine.admission_limit = {}", cfg.engine.admission_limit);
    println!(
        "  engine.reconcile_interval = {:?}",
        cfg.engine.reconcile_interval
    );
    println!("  store.kind = {:?}", cfg.store.kind);
    println!("  store.dir = {:?}", cfg.store.dir);
    println!();

    println!("tasks ({}):", cfg.tasks.len());
    for task in &cfg.tasks {
        println!("  - {}", task.name);
        match &task.spec {
            task::TaskSpec::Process(p) => println!("      command: {}", p.command),
            task::TaskSpec::Pod(p) => {
                for c in &p.containers {
                    println!("      container {}: {}", c.name, c.command);
                }
            }
        }
        if let Some(timeout) = task.spec.timeout() {
            println!("      timeout: {:?}", timeout);
        }
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_dir_resolution() {
        assert_eq!(
            resolve_store_dir(Path::new("conf/Sandboxer.toml"), Path::new("state")),
            PathBuf::from("conf/state")
        );
        assert_eq!(
            resolve_store_dir(Path::new("conf/Sandboxer.toml"), Path::new("/var/lib/sb")),
            PathBuf::from("/var/lib/sb")
        );
    }
}
