// src/engine/store.rs

//! Task reconciliation store.
//!
//! The store is the authoritative view of a run: the aggregate progress, the
//! bounded task ledger, the completion report and the sticky last error. It
//! is plain data with synchronous operations; the control runtime owns the
//! only instance and is therefore its single writer.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::jobs::ImportedJobFile;
use crate::protocol::{
    CompletionReport, FailedTaskRef, ProgressSnapshot, StoppedNotice, TaskRecord, TaskStatus,
};

/// Maximum number of tasks kept in the ledger.
pub const MAX_TASKS: usize = 100;

/// Ordered task list with an id index.
///
/// Positions are stable across updates: replacing a task keeps its slot,
/// new ids are appended, and overflow evicts from the front.
#[derive(Debug, Clone)]
pub struct TaskLedger {
    tasks: Vec<TaskRecord>,
    positions: HashMap<String, usize>,
    capacity: usize,
}

impl Default for TaskLedger {
    fn default() -> Self {
        Self::with_capacity_limit(MAX_TASKS)
    }
}

impl TaskLedger {
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            tasks: Vec::new(),
            positions: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.positions.get(id).map(|&pos| &self.tasks[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter()
    }

    pub fn as_slice(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.positions.clear();
    }

    /// Replace in place or append, then trim to capacity.
    pub fn upsert(&mut self, task: TaskRecord) {
        self.put(task);
        self.trim();
    }

    /// Apply every task in order with last-write-wins per id, trimming once
    /// at the end.
    pub fn upsert_batch(&mut self, tasks: impl IntoIterator<Item = TaskRecord>) {
        for task in tasks {
            self.put(task);
        }
        self.trim();
    }

    fn put(&mut self, task: TaskRecord) {
        match self.positions.get(&task.id) {
            Some(&pos) => self.tasks[pos] = task,
            None => {
                self.positions.insert(task.id.clone(), self.tasks.len());
                self.tasks.push(task);
            }
        }
    }

    fn trim(&mut self) {
        if self.tasks.len() <= self.capacity {
            return;
        }
        let excess = self.tasks.len() - self.capacity;
        self.tasks.drain(..excess);
        self.positions = self
            .tasks
            .iter()
            .enumerate()
            .map(|(pos, t)| (t.id.clone(), pos))
            .collect();
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskRecord> {
        self.tasks.iter_mut()
    }
}

/// Which screen the user is looking at. Not part of run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Dashboard,
    Tasks,
    Settings,
}

/// Status filter for the task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Success,
    Failed,
}

impl TaskFilter {
    pub fn matches(self, status: TaskStatus) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Success => status == TaskStatus::Success,
            TaskFilter::Failed => status == TaskStatus::Failed,
        }
    }
}

/// State owned by the user's navigation; survives `reset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationState {
    pub page: Page,
    pub task_filter: TaskFilter,
    pub imported_file: Option<ImportedJobFile>,
}

/// Per-status tally of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
}

/// Read-only snapshot of the store, handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub running: bool,
    pub completed: bool,
    pub progress: Option<ProgressSnapshot>,
    pub tasks: Vec<TaskRecord>,
    pub completion: Option<CompletionReport>,
    pub last_error: Option<String>,
    pub presentation: PresentationState,
}

impl LedgerView {
    pub fn filtered_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        let filter = self.presentation.task_filter;
        self.tasks.iter().filter(move |t| filter.matches(t.status))
    }

    pub fn status_counts(&self) -> StatusCounts {
        count_statuses(self.tasks.iter())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    running: bool,
    completed: bool,
    progress: Option<ProgressSnapshot>,
    ledger: TaskLedger,
    completion: Option<CompletionReport>,
    last_error: Option<String>,
    presentation: PresentationState,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            ledger: TaskLedger::with_capacity_limit(capacity),
            ..Self::default()
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
        if running {
            self.completed = false;
        }
    }

    /// Replace the aggregate snapshot wholesale.
    pub fn update_progress(&mut self, snapshot: ProgressSnapshot) {
        self.progress = Some(snapshot);
    }

    pub fn upsert_task(&mut self, task: TaskRecord) {
        self.ledger.upsert(task);
    }

    pub fn upsert_tasks_batch(&mut self, tasks: impl IntoIterator<Item = TaskRecord>) {
        self.ledger.upsert_batch(tasks);
    }

    /// Settle every task still pending or running against the report.
    ///
    /// Tasks named in `failed_tasks` become `failed`, every other active task
    /// becomes `success`; both get progress 100. Tasks already terminal are
    /// untouched. Failed references with no ledger entry are added as failed
    /// tasks so the failure list is complete.
    pub fn finalize(&mut self, report: CompletionReport) {
        let failed_ids: HashSet<String> =
            report.failed_tasks.iter().map(FailedTaskRef::task_id).collect();

        for task in self.ledger.iter_mut() {
            if task.status.is_active() {
                task.progress = 100.0;
                task.status = if failed_ids.contains(&task.id) {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Success
                };
            }
        }

        let missing: Vec<TaskRecord> = report
            .failed_tasks
            .iter()
            .filter(|r| !self.ledger.contains(&r.task_id()))
            .map(synthetic_failed_task)
            .collect();
        if !missing.is_empty() {
            self.ledger.upsert_batch(missing);
        }

        self.running = false;
        self.completed = true;
        self.completion = Some(report);
    }

    /// Overwrite the sticky last error.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Lifecycle backstop: the worker is gone whatever the protocol said.
    pub fn mark_stopped(&mut self, _notice: StoppedNotice) {
        self.running = false;
    }

    /// Clear all run state; navigation and the imported job file stay.
    pub fn reset(&mut self) {
        self.running = false;
        self.completed = false;
        self.progress = None;
        self.ledger.clear();
        self.completion = None;
        self.last_error = None;
    }

    pub fn set_page(&mut self, page: Page) {
        self.presentation.page = page;
    }

    pub fn set_task_filter(&mut self, filter: TaskFilter) {
        self.presentation.task_filter = filter;
    }

    pub fn set_imported_file(&mut self, file: Option<ImportedJobFile>) {
        self.presentation.imported_file = file;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        self.ledger.as_slice()
    }

    pub fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.ledger.get(id)
    }

    pub fn completion(&self) -> Option<&CompletionReport> {
        self.completion.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn presentation(&self) -> &PresentationState {
        &self.presentation
    }

    pub fn filtered_tasks(&self, filter: TaskFilter) -> Vec<&TaskRecord> {
        self.ledger.iter().filter(|t| filter.matches(t.status)).collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        count_statuses(self.ledger.iter())
    }

    pub fn view(&self) -> LedgerView {
        LedgerView {
            running: self.running,
            completed: self.completed,
            progress: self.progress.clone(),
            tasks: self.ledger.as_slice().to_vec(),
            completion: self.completion.clone(),
            last_error: self.last_error.clone(),
            presentation: self.presentation.clone(),
        }
    }
}

fn synthetic_failed_task(r: &FailedTaskRef) -> TaskRecord {
    TaskRecord {
        id: r.task_id(),
        index: r.index,
        url: r.url.clone(),
        title: r.title.clone(),
        status: TaskStatus::Failed,
        progress: 100.0,
        error: Some(r.error.clone()),
        elapsed: None,
    }
}

fn count_statuses<'a>(tasks: impl Iterator<Item = &'a TaskRecord>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for task in tasks {
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::Running => counts.running += 1,
            TaskStatus::Success => counts.success += 1,
            TaskStatus::Failed => counts.failed += 1,
        }
    }
    counts
}
