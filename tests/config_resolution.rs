// tests/config_resolution.rs

mod common;
use crate::common::TestResult;

use std::path::PathBuf;
use std::sync::Arc;

use scrapedeck::config::{
    resolve, validate_run_config, ConfigStore, PartialRunConfig, PersistedConfig, RunConfig,
};
use scrapedeck::errors::ControlError;
use scrapedeck::fs::mock::MockFileSystem;
use scrapedeck::fs::FileSystem;

const SETTINGS: &str = "/settings/scrapedeck/config.toml";

fn defaults() -> RunConfig {
    RunConfig::defaults_in("/work")
}

fn store_with(fs: &MockFileSystem) -> ConfigStore {
    ConfigStore::new(Arc::new(fs.clone()), SETTINGS, defaults())
}

#[test]
fn explicit_beats_persisted_beats_default() {
    let explicit = PartialRunConfig {
        output_dir: Some(PathBuf::from("X")),
        ..Default::default()
    };
    let persisted = PartialRunConfig {
        output_dir: Some(PathBuf::from("Y")),
        service_url: Some("http://svc:9000".into()),
        ..Default::default()
    };

    let cfg = resolve(&explicit, &persisted, &defaults());

    assert_eq!(cfg.output_dir, PathBuf::from("X"));
    assert_eq!(cfg.service_url, "http://svc:9000");
    assert_eq!(cfg.api_key, "");
    assert_eq!(cfg.max_concurrency, 15);
    assert_eq!(cfg.batch_size, 50);
    assert_eq!(cfg.timeout, 60);
}

#[test]
fn empty_strings_fall_through_to_the_next_tier() {
    let explicit = PartialRunConfig {
        service_url: Some("   ".into()),
        output_dir: Some(PathBuf::new()),
        ..Default::default()
    };
    let persisted = PartialRunConfig {
        service_url: Some("https://persisted".into()),
        api_key: Some(String::new()),
        ..Default::default()
    };

    let cfg = resolve(&explicit, &persisted, &defaults());

    assert_eq!(cfg.service_url, "https://persisted");
    assert_eq!(cfg.output_dir, PathBuf::from("/work"));
    assert_eq!(cfg.api_key, "");
}

#[test]
fn env_carries_every_run_parameter() {
    let mut cfg = defaults();
    cfg.api_key = "secret".into();
    cfg.articles_file = Some(PathBuf::from("/jobs/a.json"));

    let env: std::collections::HashMap<_, _> = cfg.to_env().into_iter().collect();

    assert_eq!(env.get("SCRAPER_OUTPUT_DIR").map(String::as_str), Some("/work"));
    assert_eq!(
        env.get("SCRAPER_SERVICE_URL").map(String::as_str),
        Some("http://localhost:8547")
    );
    assert_eq!(env.get("SCRAPER_API_KEY").map(String::as_str), Some("secret"));
    assert_eq!(env.get("SCRAPER_MAX_CONCURRENT").map(String::as_str), Some("15"));
    assert_eq!(env.get("SCRAPER_BATCH_SIZE").map(String::as_str), Some("50"));
    assert_eq!(env.get("SCRAPER_TIMEOUT").map(String::as_str), Some("60"));
    assert_eq!(env.get("SCRAPER_CONTROL_MODE").map(String::as_str), Some("1"));
    assert_eq!(
        env.get("SCRAPER_ARTICLES_FILE").map(String::as_str),
        Some("/jobs/a.json")
    );
}

#[test]
fn validation_rejects_unusable_values() {
    let mut cfg = defaults();
    assert!(validate_run_config(&cfg).is_ok());

    cfg.max_concurrency = 0;
    assert!(matches!(validate_run_config(&cfg), Err(ControlError::Config(_))));

    let mut cfg = defaults();
    cfg.timeout = 0;
    assert!(matches!(validate_run_config(&cfg), Err(ControlError::Config(_))));

    let mut cfg = defaults();
    cfg.service_url = "ftp://example.com".into();
    assert!(matches!(validate_run_config(&cfg), Err(ControlError::Config(_))));
}

#[test]
fn missing_settings_file_reads_as_defaults() -> TestResult {
    let fs = MockFileSystem::new();
    let store = store_with(&fs);

    let app = store.read()?;

    assert_eq!(app.output_dir, PathBuf::from("/work"));
    assert_eq!(app.service_url, "http://localhost:8547");
    assert_eq!(app.api_key, "");
    Ok(())
}

#[test]
fn write_fills_omitted_fields_and_round_trips() -> TestResult {
    let fs = MockFileSystem::new();
    let store = store_with(&fs);

    let written = store.write(&PersistedConfig {
        service_url: Some("https://svc.example".into()),
        ..Default::default()
    })?;

    assert_eq!(written.output_dir, PathBuf::from("/work"));
    let raw = fs.contents(SETTINGS).ok_or("settings not written")?;
    assert!(raw.contains("serviceURL = \"https://svc.example\""));
    assert!(raw.contains("outputDir"));
    assert!(raw.contains("apiKey"));

    assert_eq!(store.read()?, written);
    Ok(())
}

#[test]
fn persisted_values_feed_resolution() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(
        SETTINGS,
        "outputDir = \"/persisted/out\"\nserviceURL = \"http://persisted:1\"\n",
    );
    let store = store_with(&fs);

    let cfg = store.resolve(&PartialRunConfig {
        service_url: Some("http://explicit:2".into()),
        ..Default::default()
    });

    assert_eq!(cfg.output_dir, PathBuf::from("/persisted/out"));
    assert_eq!(cfg.service_url, "http://explicit:2");
    Ok(())
}

#[test]
fn unreadable_settings_do_not_block_resolution() {
    let fs = MockFileSystem::new();
    fs.add_file(SETTINGS, "this is = = not toml");
    let store = store_with(&fs);

    assert!(store.read().is_err());
    let cfg = store.resolve(&PartialRunConfig::default());
    assert_eq!(cfg, defaults());
}

#[test]
fn write_failures_surface_as_errors() {
    let fs = MockFileSystem::new();
    fs.fail_writes(true);
    let store = store_with(&fs);

    assert!(store.write(&PersistedConfig::default()).is_err());
    assert!(!fs.exists(std::path::Path::new(SETTINGS)));
}

#[test]
fn real_filesystem_creates_parent_directories() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("config.toml");
    let store = ConfigStore::new(
        Arc::new(scrapedeck::fs::RealFileSystem),
        &path,
        RunConfig::defaults_in(dir.path()),
    );

    store.write(&PersistedConfig {
        api_key: Some("k".into()),
        ..Default::default()
    })?;

    assert!(path.is_file());
    assert_eq!(store.read()?.api_key, "k");
    Ok(())
}
