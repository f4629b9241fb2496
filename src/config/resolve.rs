// src/config/resolve.rs

//! Three-tier configuration precedence: explicit > persisted > default.

use crate::config::model::{AppConfig, PartialRunConfig, PersistedConfig, RunConfig};

/// Merge the three tiers field by field.
///
/// Empty strings in either upper tier are treated as absent.
pub fn resolve(
    explicit: &PartialRunConfig,
    persisted: &PartialRunConfig,
    defaults: &RunConfig,
) -> RunConfig {
    let explicit = explicit.clone().normalized();
    let persisted = persisted.clone().normalized();

    RunConfig {
        output_dir: pick(explicit.output_dir, persisted.output_dir, &defaults.output_dir),
        service_url: pick(explicit.service_url, persisted.service_url, &defaults.service_url),
        api_key: pick(explicit.api_key, persisted.api_key, &defaults.api_key),
        max_concurrency: pick(
            explicit.max_concurrency,
            persisted.max_concurrency,
            &defaults.max_concurrency,
        ),
        batch_size: pick(explicit.batch_size, persisted.batch_size, &defaults.batch_size),
        timeout: pick(explicit.timeout, persisted.timeout, &defaults.timeout),
        articles_file: explicit
            .articles_file
            .or(persisted.articles_file)
            .or_else(|| defaults.articles_file.clone()),
    }
}

/// Fill the persisted record's gaps from `defaults`.
pub fn resolve_app_config(persisted: &PersistedConfig, defaults: &RunConfig) -> AppConfig {
    let resolved = resolve(
        &PartialRunConfig::default(),
        &PartialRunConfig::from(persisted),
        defaults,
    );
    AppConfig {
        output_dir: resolved.output_dir,
        service_url: resolved.service_url,
        api_key: resolved.api_key,
    }
}

fn pick<T: Clone>(explicit: Option<T>, persisted: Option<T>, default: &T) -> T {
    explicit.or(persisted).unwrap_or_else(|| default.clone())
}
