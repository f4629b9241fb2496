// src/config/validate.rs

use crate::config::model::RunConfig;
use crate::errors::{ControlError, Result};

/// Reject resolved configs the worker cannot run with.
pub fn validate_run_config(cfg: &RunConfig) -> Result<()> {
    validate_limits(cfg)?;
    validate_service_url(&cfg.service_url)?;
    Ok(())
}

fn validate_limits(cfg: &RunConfig) -> Result<()> {
    if cfg.max_concurrency == 0 {
        return Err(ControlError::Config(
            "maxConcurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.batch_size == 0 {
        return Err(ControlError::Config(
            "batchSize must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.timeout == 0 {
        return Err(ControlError::Config(
            "timeout must be at least one second (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_service_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ControlError::Config("serviceURL must not be empty".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ControlError::Config(format!(
            "serviceURL '{url}' must start with http:// or https://"
        )));
    }
    Ok(())
}
