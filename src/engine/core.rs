// src/engine/core.rs

//! Pure control core.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`ControlInput`]s and applies them to the [`TaskStore`] through the two
//! delivery policies:
//! - progress snapshots go through a [`CoalescingThrottle`]
//! - task updates go through a [`PreservingBatcher`]
//! - completion, errors, stop notices and commands apply immediately
//!
//! Worker inputs carry the run that produced them. Once a newer run has
//! begun, inputs from older runs are dropped, so a late notice from the
//! previous worker cannot touch the current run. An input from a newer run
//! begins that run, whichever of it and its `BeginRun` arrives first.
//!
//! The async shell (`engine::runtime::ControlRuntime`) is responsible for
//! reading the bridge subscriptions and sleeping until [`next_deadline`].
//! The core has no channels and no IO, so it can be tested with plain
//! `Instant`s.
//!
//! [`next_deadline`]: ControlCore::next_deadline

use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::engine::store::{Page, TaskFilter, TaskStore};
use crate::engine::throttle::{
    CoalescingThrottle, PreservingBatcher, PROGRESS_WINDOW, TASK_BATCH_WINDOW,
};
use crate::jobs::ImportedJobFile;
use crate::protocol::{
    CompletionReport, ErrorNotice, ProgressSnapshot, RunId, StoppedNotice, TaskRecord,
};

/// Mutation requested by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Reset run state and mark the store running, before `run` is spawned.
    BeginRun(RunId),
    SetRunning(bool),
    Reset,
    RecordError(String),
    ClearError,
    SetPage(Page),
    SetTaskFilter(TaskFilter),
    SetImportedFile(Option<ImportedJobFile>),
}

/// Everything the core reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlInput {
    Progress(ProgressSnapshot),
    Task(TaskRecord),
    Complete(CompletionReport),
    Error(ErrorNotice),
    Stopped(StoppedNotice),
    Command(StoreCommand),
}

/// Throttle windows used by the core.
#[derive(Debug, Clone, Copy)]
pub struct ControlOptions {
    pub progress_window: Duration,
    pub task_window: Duration,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            progress_window: PROGRESS_WINDOW,
            task_window: TASK_BATCH_WINDOW,
        }
    }
}

#[derive(Debug)]
pub struct ControlCore {
    store: TaskStore,
    progress: CoalescingThrottle<ProgressSnapshot>,
    tasks: PreservingBatcher<TaskRecord>,
    run: RunId,
}

impl Default for ControlCore {
    fn default() -> Self {
        Self::new(TaskStore::new(), ControlOptions::default())
    }
}

impl ControlCore {
    pub fn new(store: TaskStore, options: ControlOptions) -> Self {
        Self {
            store,
            progress: CoalescingThrottle::new(options.progress_window),
            tasks: PreservingBatcher::new(options.task_window),
            run: 0,
        }
    }

    /// Latest run begun, by [`StoreCommand::BeginRun`] or by its first input.
    pub fn current_run(&self) -> RunId {
        self.run
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Task updates waiting for their batch to flush.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Earliest armed timer across both policies.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.progress.deadline(), self.tasks.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Handle one worker input produced during `run`. Inputs from a run
    /// older than the current one are dropped.
    pub fn step_run(&mut self, run: RunId, input: ControlInput, now: Instant) -> bool {
        if run < self.run {
            debug!(run, current = self.run, "dropping input from a previous run");
            return false;
        }
        let begun = self.begin_run(run);
        self.step(input, now) || begun
    }

    /// Reset for `run` unless it, or a newer run, has already begun.
    fn begin_run(&mut self, run: RunId) -> bool {
        if run <= self.run {
            return false;
        }
        debug!(run, "beginning run");
        self.run = run;
        // Anything buffered belongs to the previous run.
        self.tasks.clear();
        self.progress.clear();
        self.store.reset();
        self.store.set_running(true);
        true
    }

    /// Handle one input. Returns `true` if the store changed.
    pub fn step(&mut self, input: ControlInput, now: Instant) -> bool {
        match input {
            ControlInput::Progress(snapshot) => match self.progress.offer(snapshot, now) {
                Some(snapshot) => {
                    self.store.update_progress(snapshot);
                    true
                }
                None => false,
            },
            ControlInput::Task(task) => {
                self.tasks.push(task, now);
                false
            }
            ControlInput::Complete(report) => {
                self.flush_all(now);
                debug!(
                    total = report.total,
                    success = report.success,
                    failed = report.failed,
                    "finalizing run"
                );
                self.store.finalize(report);
                true
            }
            ControlInput::Error(notice) => {
                self.store.record_error(notice.message);
                true
            }
            ControlInput::Stopped(notice) => {
                if notice.run < self.run {
                    debug!(run = notice.run, current = self.run, "ignoring stop of a previous run");
                    return false;
                }
                self.flush_all(now);
                self.store.mark_stopped(notice);
                true
            }
            ControlInput::Command(cmd) => {
                self.apply_command(cmd);
                true
            }
        }
    }

    /// Fire whichever trailing edges are due. Returns `true` if the store
    /// changed.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(snapshot) = self.progress.poll_expired(now) {
            self.store.update_progress(snapshot);
            changed = true;
        }
        if let Some(batch) = self.tasks.poll_expired(now) {
            debug!(size = batch.len(), "flushing task batch");
            self.store.upsert_tasks_batch(batch);
            changed = true;
        }
        changed
    }

    /// Apply everything still held back by the delivery policies.
    pub fn flush_all(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(batch) = self.tasks.flush() {
            self.store.upsert_tasks_batch(batch);
            changed = true;
        }
        if let Some(snapshot) = self.progress.flush(now) {
            self.store.update_progress(snapshot);
            changed = true;
        }
        changed
    }

    fn apply_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::BeginRun(run) => {
                self.begin_run(run);
            }
            StoreCommand::SetRunning(running) => self.store.set_running(running),
            StoreCommand::Reset => {
                self.tasks.clear();
                self.progress.clear();
                self.store.reset();
            }
            StoreCommand::RecordError(message) => self.store.record_error(message),
            StoreCommand::ClearError => self.store.clear_error(),
            StoreCommand::SetPage(page) => self.store.set_page(page),
            StoreCommand::SetTaskFilter(filter) => self.store.set_task_filter(filter),
            StoreCommand::SetImportedFile(file) => self.store.set_imported_file(file),
        }
    }
}
