#![allow(dead_code)]

use scrapedeck::protocol::{
    task_id_for_index, CompletionReport, FailedTaskRef, ProgressSnapshot, TaskRecord, TaskStatus,
};

/// Builder for `TaskRecord` to simplify test setup.
pub struct TaskRecordBuilder {
    task: TaskRecord,
}

impl TaskRecordBuilder {
    /// A pending task with the canonical id for `index`.
    pub fn new(index: u64) -> Self {
        Self {
            task: TaskRecord {
                id: task_id_for_index(index),
                index,
                url: format!("https://example.com/articles/{index}"),
                title: format!("Article {index}"),
                status: TaskStatus::Pending,
                progress: 0.0,
                error: None,
                elapsed: None,
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn running(self, progress: f64) -> Self {
        self.status(TaskStatus::Running).progress(progress)
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.task.progress = progress;
        self
    }

    pub fn failed(mut self, error: &str) -> Self {
        self.task.status = TaskStatus::Failed;
        self.task.progress = 100.0;
        self.task.error = Some(error.to_string());
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.task.status = TaskStatus::Success;
        self.task.progress = 100.0;
        self
    }

    pub fn elapsed(mut self, secs: f64) -> Self {
        self.task.elapsed = Some(secs);
        self
    }

    pub fn build(self) -> TaskRecord {
        self.task
    }
}

/// Builder for `ProgressSnapshot`; derived fields follow from the counts.
pub struct ProgressBuilder {
    total: u64,
    success: u64,
    failed: u64,
    running: u64,
    eta: Option<f64>,
}

impl ProgressBuilder {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            success: 0,
            failed: 0,
            running: 0,
            eta: None,
        }
    }

    pub fn success(mut self, n: u64) -> Self {
        self.success = n;
        self
    }

    pub fn failed(mut self, n: u64) -> Self {
        self.failed = n;
        self
    }

    pub fn running(mut self, n: u64) -> Self {
        self.running = n;
        self
    }

    pub fn eta(mut self, secs: f64) -> Self {
        self.eta = Some(secs);
        self
    }

    pub fn build(self) -> ProgressSnapshot {
        let completed = self.success + self.failed;
        let percentage = if self.total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / self.total as f64
        };
        ProgressSnapshot {
            total: self.total,
            completed,
            success: self.success,
            failed: self.failed,
            pending: self.total.saturating_sub(completed + self.running),
            running: self.running,
            percentage,
            eta: self.eta,
        }
    }
}

/// Builder for `CompletionReport`.
pub struct CompletionReportBuilder {
    report: CompletionReport,
}

impl CompletionReportBuilder {
    pub fn new(total: u64) -> Self {
        Self {
            report: CompletionReport {
                total,
                success: total,
                failed: 0,
                elapsed: 1.0,
                failed_tasks: Vec::new(),
            },
        }
    }

    /// Report the task at `index` as failed.
    pub fn failed(mut self, index: u64, error: &str) -> Self {
        self.report.failed_tasks.push(FailedTaskRef {
            index,
            url: format!("https://example.com/articles/{index}"),
            title: format!("Article {index}"),
            error: error.to_string(),
            id: None,
        });
        self.report.failed += 1;
        self.report.success = self.report.success.saturating_sub(1);
        self
    }

    /// Report a failure under an explicit task id.
    pub fn failed_with_id(mut self, index: u64, id: &str, error: &str) -> Self {
        self = self.failed(index, error);
        if let Some(last) = self.report.failed_tasks.last_mut() {
            last.id = Some(id.to_string());
        }
        self
    }

    pub fn elapsed(mut self, secs: f64) -> Self {
        self.report.elapsed = secs;
        self
    }

    pub fn build(self) -> CompletionReport {
        self.report
    }
}
