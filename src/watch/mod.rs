// src/watch/mod.rs

//! Manifest watching for `--watch` mode.
//!
//! Wires a cross-platform filesystem watcher (`notify`) to the manifest
//! file and uses content hashing to skip events that did not change it. It
//! does not talk to the engine; the caller syncs each reloaded manifest.

pub mod hash;
pub mod watcher;

pub use hash::{compute_file_hash, ManifestFingerprint};
pub use watcher::{spawn_manifest_watcher, WatcherHandle};
