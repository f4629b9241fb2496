// src/config/store.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::loader::{load_from_path, write_to_path};
use crate::config::model::{AppConfig, PartialRunConfig, PersistedConfig, RunConfig};
use crate::config::resolve::{resolve, resolve_app_config};
use crate::errors::Result;
use crate::fs::FileSystem;

/// Persisted settings, read before every start and written as a whole.
#[derive(Clone)]
pub struct ConfigStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    defaults: RunConfig,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>, defaults: RunConfig) -> Self {
        Self {
            fs,
            path: path.into(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> &RunConfig {
        &self.defaults
    }

    /// Raw record as stored, without defaults.
    pub fn load(&self) -> Result<PersistedConfig> {
        load_from_path(self.fs.as_ref(), &self.path)
    }

    /// Stored settings with defaults filled in for absent fields.
    pub fn read(&self) -> Result<AppConfig> {
        let persisted = self.load()?;
        Ok(resolve_app_config(&persisted, &self.defaults))
    }

    /// Persist `config`, substituting defaults for omitted fields.
    ///
    /// Returns what was written.
    pub fn write(&self, config: &PersistedConfig) -> Result<AppConfig> {
        let full = resolve_app_config(config, &self.defaults);
        write_to_path(self.fs.as_ref(), &self.path, &PersistedConfig::from(full.clone()))?;
        debug!(path = ?self.path, "settings saved");
        Ok(full)
    }

    /// Resolve the run parameters for a new start.
    ///
    /// Unreadable settings are logged and treated as empty so a broken file
    /// never blocks a run.
    pub fn resolve(&self, explicit: &PartialRunConfig) -> RunConfig {
        let persisted = match self.load() {
            Ok(p) => p,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read settings; using defaults");
                PersistedConfig::default()
            }
        };
        resolve(explicit, &PartialRunConfig::from(&persisted), &self.defaults)
    }
}
