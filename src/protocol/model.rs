// src/protocol/model.rs

use serde::{Deserialize, Serialize};

/// Generation of one supervised worker. Every event a worker produces is
/// tagged with it; `0` marks events that did not come from a supervised run.
pub type RunId = u64;

/// Status of a single extraction task as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    /// `true` for statuses that completion still has to resolve.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

/// Aggregate progress of the whole job.
///
/// Always a full aggregate, never an increment, which is why the control
/// runtime is allowed to coalesce these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub success: u64,
    pub failed: u64,
    pub pending: u64,
    pub running: u64,
    pub percentage: f64,
    /// Estimated seconds remaining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
}

impl ProgressSnapshot {
    pub(crate) fn normalize(mut self) -> Self {
        self.percentage = clamp_percent(self.percentage);
        self
    }
}

/// One item of the job, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub index: u64,
    pub url: String,
    pub title: String,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds spent on this task so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
}

impl TaskRecord {
    pub(crate) fn normalize(mut self) -> Self {
        self.progress = clamp_percent(self.progress);
        self
    }
}

/// Reference to a task the worker reports as failed in its final summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTaskRef {
    pub index: u64,
    pub url: String,
    pub title: String,
    pub error: String,
    /// Canonical task id, when the worker echoes the one it used in `task`
    /// records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FailedTaskRef {
    /// Ledger id for this reference.
    ///
    /// An echoed `id` wins; otherwise the id is derived from the index as
    /// `task-` followed by the index zero-padded to four digits.
    pub fn task_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => task_id_for_index(self.index),
        }
    }
}

/// `task-0007` style id for a worker-assigned index.
pub fn task_id_for_index(index: u64) -> String {
    format!("task-{index:04}")
}

/// Final summary the worker emits once every task has been attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Seconds for the whole job.
    pub elapsed: f64,
    #[serde(default)]
    pub failed_tasks: Vec<FailedTaskRef>,
}

/// Error surfaced to the presentation layer.
///
/// Produced either by the worker (`error` records) or by the supervisor for
/// spawn failures and abnormal exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

/// Emitted exactly once per worker lifetime when its exit has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppedNotice {
    /// The run that ended.
    pub run: RunId,
    /// Exit code, `None` when the worker was killed or died from a signal.
    pub code: Option<i32>,
}

/// A payload plus the time it was produced, in milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub timestamp: u64,
    #[serde(default)]
    pub run: RunId,
    pub data: T,
}

impl<T> Stamped<T> {
    pub fn new(timestamp: u64, data: T) -> Self {
        Self {
            timestamp,
            run: 0,
            data,
        }
    }

    pub fn in_run(mut self, run: RunId) -> Self {
        self.run = run;
        self
    }

    pub fn now(data: T) -> Self {
        Self::new(now_millis(), data)
    }
}

/// Typed event decoded from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress(Stamped<ProgressSnapshot>),
    Task(Stamped<TaskRecord>),
    Complete(Stamped<CompletionReport>),
    Error(Stamped<ErrorNotice>),
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Progress(_) => "progress",
            WorkerEvent::Task(_) => "task",
            WorkerEvent::Complete(_) => "complete",
            WorkerEvent::Error(_) => "error",
        }
    }

    /// Tag the event with the run that produced it.
    pub fn in_run(self, run: RunId) -> Self {
        match self {
            WorkerEvent::Progress(p) => WorkerEvent::Progress(p.in_run(run)),
            WorkerEvent::Task(t) => WorkerEvent::Task(t.in_run(run)),
            WorkerEvent::Complete(c) => WorkerEvent::Complete(c.in_run(run)),
            WorkerEvent::Error(e) => WorkerEvent::Error(e.in_run(run)),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
