// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Local extraction service the worker talks to when nothing else is set.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8547";
pub const DEFAULT_MAX_CONCURRENCY: u32 = 15;
pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Fully resolved parameters for one worker run.
///
/// Produced by [`crate::config::resolve`]; every field has a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub output_dir: PathBuf,
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    pub api_key: String,
    pub max_concurrency: u32,
    pub batch_size: u32,
    /// Per-request timeout handed to the worker, in seconds.
    pub timeout: u64,
    /// Job file override; the worker uses its own default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_file: Option<PathBuf>,
}

impl RunConfig {
    /// Defaults with `root` as the output directory.
    pub fn defaults_in(root: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: root.into(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            api_key: String::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT_SECS,
            articles_file: None,
        }
    }

    /// Defaults rooted at the process working directory.
    pub fn defaults() -> Self {
        Self::defaults_in(working_root())
    }

    /// Environment entries injected into the worker process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("SCRAPER_OUTPUT_DIR", self.output_dir.display().to_string()),
            ("SCRAPER_SERVICE_URL", self.service_url.clone()),
            ("SCRAPER_API_KEY", self.api_key.clone()),
            ("SCRAPER_MAX_CONCURRENT", self.max_concurrency.to_string()),
            ("SCRAPER_BATCH_SIZE", self.batch_size.to_string()),
            ("SCRAPER_TIMEOUT", self.timeout.to_string()),
            ("SCRAPER_CONTROL_MODE", "1".to_string()),
        ];
        if let Some(file) = &self.articles_file {
            env.push(("SCRAPER_ARTICLES_FILE", file.display().to_string()));
        }
        env
    }
}

/// A partially specified run configuration.
///
/// Used for both tiers above the defaults: explicit values passed to
/// `start`, and values read from the persisted store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRunConfig {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default, rename = "serviceURL")]
    pub service_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub articles_file: Option<PathBuf>,
}

impl PartialRunConfig {
    /// Empty strings and paths count as "not set" so they fall through to
    /// the next tier.
    pub fn normalized(mut self) -> Self {
        self.output_dir = self.output_dir.filter(|p| !p.as_os_str().is_empty());
        self.service_url = self.service_url.filter(|s| !s.trim().is_empty());
        self.api_key = self.api_key.filter(|s| !s.is_empty());
        self.articles_file = self.articles_file.filter(|p| !p.as_os_str().is_empty());
        self
    }
}

/// On-disk record of the persisted settings.
///
/// Every field is optional on read so hand-edited or older files still load;
/// [`crate::config::ConfigStore::write`] always writes all of them.
///
/// ```toml
/// outputDir = "/home/me/articles"
/// serviceURL = "http://localhost:8547"
/// apiKey = ""
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default, rename = "outputDir", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, rename = "serviceURL", skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl From<&PersistedConfig> for PartialRunConfig {
    fn from(p: &PersistedConfig) -> Self {
        PartialRunConfig {
            output_dir: p.output_dir.clone(),
            service_url: p.service_url.clone(),
            api_key: p.api_key.clone(),
            ..PartialRunConfig::default()
        }
        .normalized()
    }
}

/// The persisted settings with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    #[serde(rename = "outputDir")]
    pub output_dir: PathBuf,
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl From<AppConfig> for PersistedConfig {
    fn from(c: AppConfig) -> Self {
        PersistedConfig {
            output_dir: Some(c.output_dir),
            service_url: Some(c.service_url),
            api_key: Some(c.api_key),
        }
    }
}

/// The application's working root, used as the default output directory.
pub fn working_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf())
}
