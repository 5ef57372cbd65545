// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{load_and_validate, ConfigFile};
use crate::watch::hash::{compute_file_hash, ManifestFingerprint};

/// Quiet period after an event before the manifest is re-read, so an
/// editor's write-then-rename lands as one reload.
const SETTLE: Duration = Duration::from_millis(150);

/// Handle for the manifest watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `manifest` and send every new, valid version of it on the returned
/// channel.
///
/// - The parent directory is watched (non-recursively) so replaced files are
///   still seen.
/// - Content is hashed with blake3; unchanged content is not re-sent.
/// - Invalid manifests are logged and skipped; the previous one stays in force.
pub fn spawn_manifest_watcher(
    manifest: impl Into<PathBuf>,
) -> Result<(WatcherHandle, mpsc::Receiver<ConfigFile>)> {
    let manifest = manifest.into();
    let manifest = manifest.canonicalize().unwrap_or(manifest);
    let dir = manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let initial = compute_file_hash(&manifest)
        .with_context(|| format!("hashing manifest {:?}", manifest))?;
    let mut fingerprint = ManifestFingerprint::seeded(initial);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("manifest watcher loop gone; dropping event");
                }
            }
            Err(err) => warn!(error = %err, "manifest watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(manifest = ?manifest, "manifest watcher started");

    let (config_tx, config_rx) = mpsc::channel::<ConfigFile>(4);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !touches(&event, &manifest) {
                continue;
            }
            debug!(?event, "manifest event");

            // Let the burst settle, then drop whatever else queued up.
            tokio::time::sleep(SETTLE).await;
            while event_rx.try_recv().is_ok() {}

            let hash = match compute_file_hash(&manifest) {
                Ok(h) => h,
                Err(e) => {
                    debug!(error = %e, "manifest not readable yet");
                    continue;
                }
            };
            if !fingerprint.update(&hash) {
                continue;
            }

            match load_and_validate(&manifest) {
                Ok(cfg) => {
                    info!(tasks = cfg.tasks.len(), "manifest changed; reloading");
                    if config_tx.send(cfg).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring invalid manifest"),
            }
        }
        debug!("manifest watcher loop finished");
    });

    Ok((WatcherHandle { _inner: watcher }, config_rx))
}

fn touches(event: &Event, manifest: &Path) -> bool {
    let name = manifest.file_name();
    event
        .paths
        .iter()
        .any(|p| p == manifest || (name.is_some() && p.file_name() == name))
}
