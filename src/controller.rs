// src/controller.rs

//! Presentation-facing facade.
//!
//! Every operation returns an [`ApiResult`] instead of an error, so a front
//! end can render failures without unwinding. The controller owns the
//! supervisor and the control runtime; subscriptions come straight from the
//! event bridge.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ConfigStore, PartialRunConfig, PersistedConfig, RunConfig};
use crate::engine::{
    ControlCore, ControlHandle, ControlOptions, ControlRuntime, EventBridge, LedgerView, Page,
    StoreCommand, Subscription, TaskFilter, TaskStore, MAX_TASKS,
};
use crate::errors::{ControlError, Result};
use crate::exec::{Supervisor, WorkerSpec, WorkerStatus, STOP_GRACE};
use crate::fs::FileSystem;
use crate::jobs::{read_job_file, ImportedJobFile};
use crate::protocol::{
    CompletionReport, ErrorNotice, ProgressSnapshot, Stamped, StoppedNotice, TaskRecord,
};

/// `{success, data?, error?}` result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

impl<T> From<Result<T>> for ApiResult<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(data) => ApiResult::ok(data),
            Err(e) => ApiResult::err(e.to_string()),
        }
    }
}

/// Tunables for a [`Controller`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub stop_grace: Duration,
    pub control: ControlOptions,
    pub task_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stop_grace: STOP_GRACE,
            control: ControlOptions::default(),
            task_capacity: MAX_TASKS,
        }
    }
}

pub struct Controller {
    supervisor: Supervisor,
    bridge: Arc<EventBridge>,
    control: ControlHandle,
    runtime: JoinHandle<()>,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Build a controller and spawn its control runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(spec: WorkerSpec, config: ConfigStore, fs: Arc<dyn FileSystem>) -> Self {
        Self::with_options(spec, config, fs, ControllerOptions::default())
    }

    pub fn with_options(
        spec: WorkerSpec,
        config: ConfigStore,
        fs: Arc<dyn FileSystem>,
        options: ControllerOptions,
    ) -> Self {
        let bridge = Arc::new(EventBridge::new());
        let core = ControlCore::new(
            TaskStore::with_capacity_limit(options.task_capacity),
            options.control,
        );
        let (control, runtime) = ControlRuntime::spawn(core, &bridge);
        let supervisor =
            Supervisor::new(spec, config, bridge.clone()).with_grace(options.stop_grace);

        Self {
            supervisor,
            bridge,
            control,
            runtime,
            fs,
        }
    }

    /// Start a run. The store is reset only once the worker slot is ours, so
    /// a rejected start leaves the current run's ledger untouched.
    pub fn start(&self, explicit: PartialRunConfig) -> ApiResult<RunConfig> {
        let mut claimed = false;
        let res = self.supervisor.start_with(&explicit, |run, _| {
            claimed = true;
            self.control.send(StoreCommand::BeginRun(run));
        });

        match res {
            Ok(cfg) => ApiResult::ok(cfg),
            Err(e @ ControlError::AlreadyRunning) => ApiResult::err(e.to_string()),
            Err(e) => {
                warn!(error = %e, "start failed");
                if claimed {
                    self.control.send(StoreCommand::SetRunning(false));
                }
                // A failed spawn reaches the store as the run's error notice.
                if !matches!(e, ControlError::SpawnFailure(_)) {
                    self.control.send(StoreCommand::RecordError(e.to_string()));
                }
                ApiResult::err(e.to_string())
            }
        }
    }

    /// Request a graceful stop.
    pub fn stop(&self) -> ApiResult<()> {
        self.supervisor.stop().into()
    }

    pub fn status(&self) -> WorkerStatus {
        self.supervisor.status()
    }

    pub fn on_progress(&self) -> Subscription<Stamped<ProgressSnapshot>> {
        self.bridge.on_progress()
    }

    pub fn on_task_update(&self) -> Subscription<Stamped<TaskRecord>> {
        self.bridge.on_task_update()
    }

    pub fn on_complete(&self) -> Subscription<Stamped<CompletionReport>> {
        self.bridge.on_complete()
    }

    pub fn on_error(&self) -> Subscription<Stamped<ErrorNotice>> {
        self.bridge.on_error()
    }

    pub fn on_stopped(&self) -> Subscription<StoppedNotice> {
        self.bridge.on_stopped()
    }

    pub fn read_config(&self) -> ApiResult<AppConfig> {
        self.supervisor.config().read().into()
    }

    pub fn write_config(&self, config: &PersistedConfig) -> ApiResult<AppConfig> {
        let res = self.supervisor.config().write(config);
        if let Err(e) = &res {
            warn!(error = %e, "failed to save settings");
        }
        res.into()
    }

    /// Read a chosen job file and remember it as the current selection.
    pub fn import_job_file(&self, path: impl AsRef<Path>) -> ApiResult<ImportedJobFile> {
        let path = path.as_ref();
        match read_job_file(self.fs.as_ref(), path) {
            Ok(job) => {
                let summary = job.summary();
                info!(path = ?summary.path, articles = summary.article_count, "job file imported");
                self.control
                    .send(StoreCommand::SetImportedFile(Some(summary.clone())));
                ApiResult::ok(summary)
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to import job file");
                ApiResult::err(e.to_string())
            }
        }
    }

    /// Accept a chosen output directory if it exists.
    pub fn select_output_dir(&self, path: impl AsRef<Path>) -> ApiResult<std::path::PathBuf> {
        let path = path.as_ref();
        if self.fs.is_dir(path) {
            ApiResult::ok(path.to_path_buf())
        } else {
            ApiResult::err(format!("{path:?} is not a directory"))
        }
    }

    pub fn set_page(&self, page: Page) {
        self.control.send(StoreCommand::SetPage(page));
    }

    pub fn set_task_filter(&self, filter: TaskFilter) {
        self.control.send(StoreCommand::SetTaskFilter(filter));
    }

    pub fn clear_error(&self) {
        self.control.send(StoreCommand::ClearError);
    }

    /// Reset run state, keeping the presentation selections.
    pub fn reset(&self) {
        self.control.send(StoreCommand::Reset);
    }

    /// Latest store snapshot.
    pub fn view(&self) -> LedgerView {
        self.control.view()
    }

    /// Receiver notified after every store change.
    pub fn watch(&self) -> watch::Receiver<LedgerView> {
        self.control.watch()
    }

    /// Kill any live worker and wait for its stopped notice to be published.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        debug!("controller shut down");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.runtime.abort();
    }
}
