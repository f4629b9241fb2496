// src/lib.rs

pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod jobs;
pub mod logging;
pub mod protocol;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, ConfigCommand, RunArgs};
use crate::config::{default_config_path, ConfigStore, RunConfig};
use crate::controller::Controller;
use crate::engine::LedgerView;
use crate::exec::WorkerSpec;
use crate::fs::{FileSystem, RealFileSystem};
use crate::jobs::read_job_file;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings store
/// - controller (supervisor + control runtime)
/// - Ctrl-C handling
/// - progress logging and the final summary
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let store = ConfigStore::new(fs.clone(), &config_path, RunConfig::defaults());
    debug!(path = ?config_path, "using settings file");

    match args.command {
        Command::Run(run_args) => run_job(run_args, store, fs).await,
        Command::Config(cmd) => run_config(&cmd, &store),
        Command::Inspect { job_file } => inspect(fs.as_ref(), &job_file),
    }
}

async fn run_job(args: RunArgs, store: ConfigStore, fs: Arc<dyn FileSystem>) -> Result<()> {
    let mut spec = WorkerSpec::new(&args.worker);
    if let Some(dir) = &args.worker_dir {
        spec = spec.in_dir(dir);
    }
    let controller = Controller::new(spec, store, fs);

    if let Some(file) = &args.articles_file {
        controller
            .import_job_file(file)
            .into_result()
            .map_err(|e| anyhow!("cannot use job file: {e}"))?;
    }

    // Subscribe before starting so the stopped notice cannot be missed.
    let mut stopped = controller.on_stopped();
    let mut view_rx = controller.watch();

    let cfg = controller
        .start(args.overrides())
        .into_result()
        .map_err(|e| anyhow!("failed to start worker: {e}"))?;
    if let Some(cfg) = &cfg {
        info!(
            output_dir = ?cfg.output_dir,
            service_url = %cfg.service_url,
            max_concurrency = cfg.max_concurrency,
            batch_size = cfg.batch_size,
            timeout = cfg.timeout,
            "run started"
        );
    }

    let mut interrupts = 0u32;
    let mut ctrl_c_ok = true;
    let mut view_ok = true;
    let mut last_completed = None;

    let notice = loop {
        tokio::select! {
            notice = stopped.recv() => break notice,
            res = tokio::signal::ctrl_c(), if ctrl_c_ok => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    ctrl_c_ok = false;
                    continue;
                }
                interrupts += 1;
                if interrupts == 1 {
                    info!("stopping worker (Ctrl-C again to kill)");
                    if let Err(e) = controller.stop().into_result() {
                        warn!(error = %e, "stop request failed");
                    }
                } else {
                    warn!("killing worker");
                    controller.shutdown().await;
                }
            }
            changed = view_rx.changed(), if view_ok => {
                if changed.is_err() {
                    view_ok = false;
                    continue;
                }
                let view = view_rx.borrow_and_update().clone();
                log_progress(&view, &mut last_completed);
            }
        }
    };

    // The runtime applies the stopped notice shortly after it is published.
    if timeout(Duration::from_secs(1), view_rx.wait_for(|v| !v.running))
        .await
        .is_err()
    {
        debug!("store did not settle after stop");
    }

    let view = controller.view();
    print_summary(&view, notice.and_then(|n| n.code));
    controller.shutdown().await;

    if let Some(err) = view.last_error {
        bail!("worker run failed: {err}");
    }
    Ok(())
}

fn log_progress(view: &LedgerView, last_completed: &mut Option<u64>) {
    let Some(progress) = &view.progress else {
        return;
    };
    if *last_completed == Some(progress.completed) {
        return;
    }
    *last_completed = Some(progress.completed);
    info!(
        completed = progress.completed,
        total = progress.total,
        success = progress.success,
        failed = progress.failed,
        percentage = %format!("{:.1}", progress.percentage),
        eta = ?progress.eta,
        "progress"
    );
}

fn print_summary(view: &LedgerView, exit_code: Option<i32>) {
    println!("scrapedeck run summary");
    match exit_code {
        Some(code) => println!("  exit code: {code}"),
        None => println!("  exit code: none (killed)"),
    }

    match &view.completion {
        Some(report) => {
            println!(
                "  total: {}  success: {}  failed: {}  elapsed: {:.1}s",
                report.total, report.success, report.failed, report.elapsed
            );
        }
        None => {
            let counts = view.status_counts();
            println!(
                "  incomplete run; tracked tasks: {}  success: {}  failed: {}",
                view.tasks.len(),
                counts.success,
                counts.failed
            );
        }
    }

    let failed: Vec<_> = view
        .tasks
        .iter()
        .filter(|t| t.status == protocol::TaskStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!("  failed tasks:");
        for task in failed {
            println!(
                "    - {} {}: {}",
                task.id,
                task.url,
                task.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if let Some(err) = &view.last_error {
        println!("  last error: {err}");
    }
}

fn run_config(cmd: &ConfigCommand, store: &ConfigStore) -> Result<()> {
    let shown = match cmd {
        ConfigCommand::Show => store.read()?,
        ConfigCommand::Set { .. } => {
            let next = cmd.apply_to(store.load()?);
            let written = store.write(&next)?;
            info!(path = ?store.path(), "settings updated");
            written
        }
    };
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn inspect(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let job = read_job_file(fs, path)?;
    println!("{}: {} articles", path.display(), job.article_count());
    Ok(())
}
