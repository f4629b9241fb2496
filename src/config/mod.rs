// src/config/mod.rs

//! Run configuration for the worker.
//!
//! Responsibilities:
//! - Define the resolved/partial/persisted data model (`model.rs`).
//! - Merge explicit, persisted and default values (`resolve.rs`).
//! - Read and write the persisted settings file (`loader.rs`, `store.rs`).
//! - Reject unusable resolved values (`validate.rs`).

pub mod loader;
pub mod model;
pub mod resolve;
pub mod store;
pub mod validate;

pub use loader::{default_config_path, load_from_path};
pub use model::{AppConfig, PartialRunConfig, PersistedConfig, RunConfig};
pub use resolve::{resolve, resolve_app_config};
pub use store::ConfigStore;
pub use validate::validate_run_config;
