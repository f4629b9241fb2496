use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use scrapedeck::config::{ConfigStore, RunConfig};
use scrapedeck::controller::{Controller, ControllerOptions};
use scrapedeck::exec::WorkerSpec;
use scrapedeck::fs::mock::MockFileSystem;

/// A shell script standing in for the extraction worker.
///
/// The script lives in its own temporary directory, which is also used as
/// the default output directory for runs driven by it.
pub struct FakeWorker {
    dir: TempDir,
    script: PathBuf,
}

impl FakeWorker {
    /// Write `body` as a `/bin/sh` script.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir for fake worker");
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write fake worker");
        Self { dir, script }
    }

    /// A worker that prints `lines` on stdout and exits 0.
    pub fn emitting(lines: &[String]) -> Self {
        Self::new(&format!("cat <<'EOF'\n{}\nEOF", lines.join("\n")))
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// The launching shell is replaced by the script, so the script's own
    /// traps decide how an interrupt ends the run.
    pub fn spec(&self) -> WorkerSpec {
        WorkerSpec::new(format!("exec sh '{}'", self.script.display())).in_dir(self.dir.path())
    }

    /// Settings backed by an empty in-memory store, defaulting the output
    /// directory to the worker's temp dir.
    pub fn config_store(&self) -> (ConfigStore, MockFileSystem) {
        let fs = MockFileSystem::new();
        let store = ConfigStore::new(
            Arc::new(fs.clone()),
            "/settings/config.toml",
            RunConfig::defaults_in(self.dir.path()),
        );
        (store, fs)
    }

    /// A controller driving this worker.
    pub fn controller(&self, options: ControllerOptions) -> (Controller, MockFileSystem) {
        let (store, fs) = self.config_store();
        let controller =
            Controller::with_options(self.spec(), store, Arc::new(fs.clone()), options);
        (controller, fs)
    }
}

/// One protocol line: `{"type": kind, "timestamp": .., "data": data}`.
pub fn envelope(kind: &str, data: Value) -> String {
    json!({ "type": kind, "timestamp": 1_700_000_000_000u64, "data": data }).to_string()
}

/// One `error` record with top-level message and code.
pub fn error_line(message: &str, code: Option<i32>) -> String {
    let mut record = json!({ "type": "error", "message": message });
    if let Some(code) = code {
        record["code"] = json!(code);
    }
    record.to_string()
}

pub fn task_line(index: u64, status: &str, progress: f64) -> String {
    envelope(
        "task",
        json!({
            "id": format!("task-{index:04}"),
            "index": index,
            "url": format!("https://example.com/articles/{index}"),
            "title": format!("Article {index}"),
            "status": status,
            "progress": progress,
        }),
    )
}

pub fn progress_line(total: u64, completed: u64) -> String {
    let percentage = if total == 0 {
        0.0
    } else {
        completed as f64 * 100.0 / total as f64
    };
    envelope(
        "progress",
        json!({
            "total": total,
            "completed": completed,
            "success": completed,
            "failed": 0,
            "pending": total - completed,
            "running": 0,
            "percentage": percentage,
        }),
    )
}

pub fn complete_line(total: u64, failed: &[(u64, &str)]) -> String {
    let failed_tasks: Vec<Value> = failed
        .iter()
        .map(|(index, error)| {
            json!({
                "index": index,
                "url": format!("https://example.com/articles/{index}"),
                "title": format!("Article {index}"),
                "error": error,
            })
        })
        .collect();
    envelope(
        "complete",
        json!({
            "total": total,
            "success": total - failed.len() as u64,
            "failed": failed.len(),
            "elapsed": 2.5,
            "failedTasks": failed_tasks,
        }),
    )
}
