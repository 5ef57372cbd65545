// src/config/mod.rs

//! Manifest loading and validation for sandboxer.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest from disk (`loader.rs`).
//! - Validate it into engine options and desired tasks (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ContainerConfig, EngineSection, RawConfigFile, StoreSection, TaskConfig,
};
