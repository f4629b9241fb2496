// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{PartialRunConfig, PersistedConfig};

/// Command-line arguments for `scrapedeck`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scrapedeck",
    version,
    about = "Supervise a content-extraction worker and track its tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `scrapedeck/config.toml` under the platform config directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRAPEDECK_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one job to completion. Ctrl-C stops the worker; a second Ctrl-C
    /// kills it.
    Run(RunArgs),

    /// Show or change the persisted settings.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print how many articles a job file contains.
    Inspect {
        #[arg(value_name = "JOB_FILE")]
        job_file: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Worker command line, run through the platform shell.
    #[arg(long, value_name = "CMD")]
    pub worker: String,

    /// Directory the worker is started in.
    #[arg(long, value_name = "DIR")]
    pub worker_dir: Option<PathBuf>,

    /// Job file with the articles to extract.
    #[arg(long, value_name = "PATH")]
    pub articles_file: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    pub service_url: Option<String>,

    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<u32>,

    #[arg(long, value_name = "N")]
    pub batch_size: Option<u32>,

    /// Per-article timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl RunArgs {
    /// The explicit tier of the run configuration.
    pub fn overrides(&self) -> PartialRunConfig {
        PartialRunConfig {
            output_dir: self.output_dir.clone(),
            service_url: self.service_url.clone(),
            api_key: self.api_key.clone(),
            max_concurrency: self.max_concurrency,
            batch_size: self.batch_size,
            timeout: self.timeout,
            articles_file: self.articles_file.clone(),
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the settings with defaults filled in.
    Show,

    /// Update settings; omitted fields keep their stored value.
    Set {
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        #[arg(long, value_name = "URL")]
        service_url: Option<String>,

        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,
    },
}

impl ConfigCommand {
    /// Layer the `set` flags over `current`.
    pub fn apply_to(&self, current: PersistedConfig) -> PersistedConfig {
        match self {
            ConfigCommand::Show => current,
            ConfigCommand::Set {
                output_dir,
                service_url,
                api_key,
            } => PersistedConfig {
                output_dir: output_dir.clone().or(current.output_dir),
                service_url: service_url.clone().or(current.service_url),
                api_key: api_key.clone().or(current.api_key),
            },
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
