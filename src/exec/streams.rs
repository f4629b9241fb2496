// src/exec/streams.rs

//! Readers attached to the worker's output pipes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::EventBridge;
use crate::logging::WORKER_TARGET;
use crate::protocol::{decode_stream, RunId, WorkerEvent};

/// Decode stdout and forward every event to the bridge, tagged with `run`.
///
/// `saw_error` is raised when the worker reports a structured error, so the
/// exit handler does not publish a second, less specific one.
pub fn spawn_stdout_decoder(
    stdout: ChildStdout,
    bridge: Arc<EventBridge>,
    saw_error: Arc<AtomicBool>,
    pid: u32,
    run: RunId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = decode_stream(stdout, |event| {
            if matches!(event, WorkerEvent::Error(_)) {
                saw_error.store(true, Ordering::Release);
            }
            bridge.publish(event.in_run(run));
        })
        .await;

        match result {
            Ok(stats) => debug!(
                pid,
                events = stats.events,
                diagnostics = stats.diagnostics,
                skipped = stats.skipped,
                "worker stdout closed"
            ),
            Err(e) => warn!(pid, error = %e, "failed reading worker stdout"),
        }
    })
}

/// Drain stderr line by line into the log so the pipe never fills up.
pub fn spawn_stderr_logger(stderr: ChildStderr, pid: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if !line.is_empty() {
                        warn!(target: WORKER_TARGET, pid, "{}", line);
                    }
                }
                Err(e) => {
                    warn!(pid, error = %e, "failed reading worker stderr");
                    break;
                }
            }
        }
    })
}
