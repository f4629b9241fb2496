// src/exec/supervisor.rs

//! Owner of the single worker process.
//!
//! At most one worker exists at a time. The lifecycle lives in an atomic so
//! that concurrent `start` calls race on one compare-and-set and exactly one
//! of them wins. A monitor task per worker waits for exit, escalates an
//! ignored interrupt to a kill, and publishes the final stopped notice.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{validate_run_config, ConfigStore, PartialRunConfig, RunConfig};
use crate::engine::EventBridge;
use crate::errors::{ControlError, Result};
use crate::exec::signals;
use crate::exec::streams::{spawn_stderr_logger, spawn_stdout_decoder};
use crate::exec::worker::WorkerSpec;
use crate::protocol::{ErrorNotice, RunId, StoppedNotice};

/// Time a worker gets to exit after an interrupt before it is killed.
pub const STOP_GRACE: Duration = Duration::from_millis(3000);

/// Upper bound on waiting for output readers after the worker exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the monitor during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Lifecycle::Starting,
            2 => Lifecycle::Running,
            3 => Lifecycle::Stopping,
            _ => Lifecycle::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: Lifecycle,
    pub pid: Option<u32>,
    /// Run of the live worker.
    pub run: Option<RunId>,
}

#[derive(Debug)]
enum MonitorSignal {
    /// An interrupt was sent; arm the grace timer.
    Stop,
    /// Kill now.
    Kill,
}

struct ActiveWorker {
    pid: u32,
    run: RunId,
    control: mpsc::UnboundedSender<MonitorSignal>,
    monitor: Option<JoinHandle<()>>,
}

struct Shared {
    state: AtomicU8,
    last_run: AtomicU64,
    active: Mutex<Option<ActiveWorker>>,
    bridge: Arc<EventBridge>,
}

impl Shared {
    fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: Lifecycle) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> std::result::Result<(), Lifecycle> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Lifecycle::from_u8)
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveWorker>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the handle for `pid` and return to idle.
    fn finish(&self, pid: u32) {
        let mut active = self.active();
        if active.as_ref().is_some_and(|w| w.pid == pid) {
            *active = None;
        }
        self.set_state(Lifecycle::Idle);
    }
}

pub struct Supervisor {
    shared: Arc<Shared>,
    spec: WorkerSpec,
    config: ConfigStore,
    grace: Duration,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("spec", &self.spec)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(spec: WorkerSpec, config: ConfigStore, bridge: Arc<EventBridge>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(Lifecycle::Idle as u8),
                last_run: AtomicU64::new(0),
                active: Mutex::new(None),
                bridge,
            }),
            spec,
            config,
            grace: STOP_GRACE,
        }
    }

    /// Override the interrupt grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.shared.bridge
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn status(&self) -> WorkerStatus {
        let active = self.shared.active();
        WorkerStatus {
            state: self.shared.state(),
            pid: active.as_ref().map(|w| w.pid),
            run: active.as_ref().map(|w| w.run),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state() != Lifecycle::Idle
    }

    /// Launch the worker with `explicit` layered over the persisted settings.
    pub fn start(&self, explicit: &PartialRunConfig) -> Result<RunConfig> {
        self.start_with(explicit, |_, _| {})
    }

    /// Like [`start`](Self::start), calling `before_spawn` with the new run id
    /// once this call has claimed the worker slot and the configuration is
    /// valid, right before the process is launched.
    ///
    /// Every event the worker produces, including its stopped notice and a
    /// spawn failure, is tagged with that run id.
    pub fn start_with<F>(&self, explicit: &PartialRunConfig, before_spawn: F) -> Result<RunConfig>
    where
        F: FnOnce(RunId, &RunConfig),
    {
        if self
            .shared
            .transition(Lifecycle::Idle, Lifecycle::Starting)
            .is_err()
        {
            debug!("start rejected; worker already active");
            return Err(ControlError::AlreadyRunning);
        }

        let config = self.config.resolve(explicit);
        if let Err(e) = validate_run_config(&config) {
            self.shared.set_state(Lifecycle::Idle);
            return Err(e);
        }

        let run = self.shared.last_run.fetch_add(1, Ordering::AcqRel) + 1;
        before_spawn(run, &config);

        let mut child = match self.spec.build_command(&config).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(command = %self.spec.command, run, error = %e, "failed to spawn worker");
                return Err(self.spawn_failed(run, e.to_string()));
            }
        };

        let Some(pid) = child.id() else {
            return Err(self.spawn_failed(run, "worker exited before it could be tracked".into()));
        };

        let saw_error = Arc::new(AtomicBool::new(false));
        let stdout_task = child.stdout.take().map(|out| {
            spawn_stdout_decoder(out, self.shared.bridge.clone(), saw_error.clone(), pid, run)
        });
        let stderr_task = child.stderr.take().map(|err| spawn_stderr_logger(err, pid));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *self.shared.active() = Some(ActiveWorker {
            pid,
            run,
            control: control_tx,
            monitor: None,
        });
        self.shared.set_state(Lifecycle::Running);

        info!(
            pid,
            run,
            command = %self.spec.command,
            output_dir = ?config.output_dir,
            service_url = %config.service_url,
            "worker started"
        );

        let monitor = tokio::spawn(monitor_worker(Monitor {
            child,
            pid,
            run,
            control: control_rx,
            grace: self.grace,
            stdout_task,
            stderr_task,
            saw_error,
            shared: self.shared.clone(),
        }));

        // The worker may already have exited and cleared its slot.
        if let Some(active) = self.shared.active().as_mut() {
            if active.pid == pid {
                active.monitor = Some(monitor);
            }
        }

        Ok(config)
    }

    /// Return to idle and surface a failed launch as the run's error notice.
    fn spawn_failed(&self, run: RunId, reason: String) -> ControlError {
        self.shared.set_state(Lifecycle::Idle);
        let err = ControlError::SpawnFailure(reason);
        self.shared.bridge.publish_error(
            run,
            ErrorNotice {
                message: err.to_string(),
                code: None,
            },
        );
        err
    }

    /// Interrupt the worker's process group and arm the kill timer.
    ///
    /// Returns once the request is issued; the stopped notice follows when
    /// the worker has actually exited. A stop while one is already pending
    /// is a no-op.
    pub fn stop(&self) -> Result<()> {
        match self.shared.transition(Lifecycle::Running, Lifecycle::Stopping) {
            Ok(()) => {}
            Err(Lifecycle::Stopping) => {
                debug!("stop already in progress");
                return Ok(());
            }
            Err(_) => return Err(ControlError::NotRunning),
        }

        let active = self.shared.active();
        let Some(worker) = active.as_ref() else {
            // Exited between the transition and here; its monitor publishes
            // the stopped notice.
            return Ok(());
        };

        info!(pid = worker.pid, grace_ms = self.grace.as_millis() as u64, "stopping worker");
        if let Err(e) = signals::interrupt(worker.pid) {
            warn!(pid = worker.pid, error = %e, "failed to interrupt worker");
        }
        if worker.control.send(MonitorSignal::Stop).is_err() {
            debug!(pid = worker.pid, "worker monitor already finished");
        }
        Ok(())
    }

    /// Kill any live worker and wait (bounded) for its monitor to finish.
    pub async fn shutdown(&self) {
        let monitor = {
            let mut active = self.shared.active();
            let Some(worker) = active.as_mut() else {
                return;
            };
            self.shared.set_state(Lifecycle::Stopping);
            info!(pid = worker.pid, "shutting down worker");
            if let Err(e) = signals::kill_hard(worker.pid) {
                warn!(pid = worker.pid, error = %e, "failed to kill worker process group");
            }
            let _ = worker.control.send(MonitorSignal::Kill);
            worker.monitor.take()
        };

        if let Some(handle) = monitor {
            match timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "worker monitor task failed"),
                Err(_) => warn!("timed out waiting for worker monitor"),
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(worker) = self.shared.active().as_ref() {
            debug!(pid = worker.pid, "supervisor dropped with live worker; killing group");
            let _ = signals::kill_hard(worker.pid);
        }
    }
}

struct Monitor {
    child: Child,
    pid: u32,
    run: RunId,
    control: mpsc::UnboundedReceiver<MonitorSignal>,
    grace: Duration,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    saw_error: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

async fn monitor_worker(mut m: Monitor) {
    let pid = m.pid;
    let run = m.run;
    let mut deadline: Option<Instant> = None;

    let code = loop {
        tokio::select! {
            status = m.child.wait() => {
                break match status {
                    Ok(status) => {
                        info!(pid, exit_code = ?status.code(), success = status.success(), "worker exited");
                        status.code()
                    }
                    Err(e) => {
                        warn!(pid, error = %e, "failed waiting for worker");
                        None
                    }
                };
            }
            Some(signal) = m.control.recv() => match signal {
                MonitorSignal::Stop => {
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + m.grace);
                    }
                }
                MonitorSignal::Kill => {
                    force_kill(&mut m.child, pid).await;
                    break None;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!(pid, grace_ms = m.grace.as_millis() as u64, "worker ignored interrupt; killing");
                force_kill(&mut m.child, pid).await;
                break None;
            }
        }
    };

    // Everything the worker wrote before exiting is published before the
    // stopped notice.
    drain(m.stdout_task, pid, "stdout").await;
    drain(m.stderr_task, pid, "stderr").await;

    if let Some(exit_code) = code.filter(|c| *c != 0) {
        if !m.saw_error.load(Ordering::Acquire) {
            m.shared.bridge.publish_error(
                run,
                ErrorNotice {
                    message: format!("worker exited with code {exit_code}"),
                    code: Some(exit_code),
                },
            );
        }
    }

    m.shared.finish(pid);
    m.shared.bridge.publish_stopped(StoppedNotice { run, code });
}

async fn force_kill(child: &mut Child, pid: u32) {
    if let Err(e) = signals::kill_hard(pid) {
        warn!(pid, error = %e, "failed to kill worker process group");
    }
    if let Err(e) = child.kill().await {
        debug!(pid, error = %e, "worker already gone");
    }
}

async fn drain(task: Option<JoinHandle<()>>, pid: u32, stream: &'static str) {
    let Some(mut task) = task else {
        return;
    };
    if timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
        warn!(pid, stream, "worker output still open after exit; abandoning reader");
        task.abort();
    }
}
