// src/config/loader.rs

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::PersistedConfig;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Load the persisted settings record from `path`.
///
/// A missing file is not an error: it reads as an empty record so every
/// field falls back to its default.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<PersistedConfig> {
    let path = path.as_ref();
    if !fs.exists(path) {
        return Ok(PersistedConfig::default());
    }

    let contents = fs.read_to_string(path)?;
    let config: PersistedConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Serialize `config` as TOML and write it to `path`, creating parent
/// directories as needed.
pub fn write_to_path(
    fs: &dyn FileSystem,
    path: impl AsRef<Path>,
    config: &PersistedConfig,
) -> Result<()> {
    let path = path.as_ref();
    let contents = toml::to_string_pretty(config)?;
    fs.write(path, contents.as_bytes())
        .with_context(|| format!("saving settings to {:?}", path))?;
    Ok(())
}

/// Application-scoped location of the settings file.
///
/// `<config dir>/scrapedeck/config.toml`, or `.scrapedeck/config.toml` under
/// the working directory on platforms without a config dir.
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("scrapedeck").join("config.toml"),
        None => PathBuf::from(".scrapedeck").join("config.toml"),
    }
}
