// src/engine/runtime.rs

use std::fmt;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::engine::bridge::{EventBridge, Subscription};
use crate::engine::core::{ControlCore, ControlInput, StoreCommand};
use crate::engine::store::LedgerView;
use crate::protocol::{
    CompletionReport, ErrorNotice, ProgressSnapshot, Stamped, StoppedNotice, TaskRecord,
};

/// Single writer of the task store.
///
/// This is a pure IO shell around [`ControlCore`]: it reads the bridge
/// subscriptions and the command channel, sleeps until the core's next
/// deadline, and publishes a fresh [`LedgerView`] whenever the store
/// changes.
pub struct ControlRuntime {
    core: ControlCore,
    progress: Subscription<Stamped<ProgressSnapshot>>,
    tasks: Subscription<Stamped<TaskRecord>>,
    complete: Subscription<Stamped<CompletionReport>>,
    errors: Subscription<Stamped<ErrorNotice>>,
    stopped: Subscription<StoppedNotice>,
    commands: mpsc::UnboundedReceiver<StoreCommand>,
    view_tx: watch::Sender<LedgerView>,
}

impl fmt::Debug for ControlRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlRuntime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

/// Presentation-side handle to a running [`ControlRuntime`].
#[derive(Debug, Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<StoreCommand>,
    view: watch::Receiver<LedgerView>,
}

impl ControlHandle {
    /// Queue a store mutation. Ignored once the runtime has exited.
    pub fn send(&self, cmd: StoreCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("control runtime gone; dropping store command");
        }
    }

    /// Current snapshot of the store.
    pub fn view(&self) -> LedgerView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified on every store change.
    pub fn watch(&self) -> watch::Receiver<LedgerView> {
        self.view.clone()
    }
}

impl ControlRuntime {
    pub fn new(core: ControlCore, bridge: &EventBridge) -> (Self, ControlHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(core.store().view());

        let runtime = Self {
            core,
            progress: bridge.on_progress(),
            tasks: bridge.on_task_update(),
            complete: bridge.on_complete(),
            errors: bridge.on_error(),
            stopped: bridge.on_stopped(),
            commands: cmd_rx,
            view_tx,
        };
        let handle = ControlHandle {
            commands: cmd_tx,
            view: view_rx,
        };
        (runtime, handle)
    }

    /// Spawn the runtime on the current Tokio runtime.
    pub fn spawn(core: ControlCore, bridge: &EventBridge) -> (ControlHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(core, bridge);
        let join = tokio::spawn(runtime.run());
        (handle, join)
    }

    /// Main loop. Exits when every handle (and so the command channel) is
    /// dropped.
    pub async fn run(mut self) {
        info!("control runtime started");

        loop {
            let deadline = self.core.next_deadline();

            // Worker inputs carry their run; commands apply unconditionally.
            let mut drained = false;
            let (run, input) = tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => (None, ControlInput::Command(cmd)),
                    None => break,
                },
                Some(task) = self.tasks.recv() => (Some(task.run), ControlInput::Task(task.data)),
                Some(progress) = self.progress.recv() => {
                    (Some(progress.run), ControlInput::Progress(progress.data))
                }
                Some(report) = self.complete.recv() => {
                    drained = self.drain_queued(Instant::now());
                    (Some(report.run), ControlInput::Complete(report.data))
                }
                Some(error) = self.errors.recv() => (Some(error.run), ControlInput::Error(error.data)),
                Some(notice) = self.stopped.recv() => {
                    drained = self.drain_queued(Instant::now());
                    (Some(notice.run), ControlInput::Stopped(notice))
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.core.on_timer(Instant::now()) {
                        self.publish_view();
                    }
                    continue;
                }
            };

            let now = Instant::now();
            let changed = match run {
                Some(run) => self.core.step_run(run, input, now),
                None => self.core.step(input, now),
            };
            if changed || drained {
                self.publish_view();
            }
        }

        info!("control runtime exiting");
    }

    /// Pull every update already queued on the per-item topics into the
    /// core, so a completion or stop notice is applied after them even
    /// though they travelled on separate channels.
    fn drain_queued(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some(task) = self.tasks.try_recv() {
            changed |= self.core.step_run(task.run, ControlInput::Task(task.data), now);
        }
        while let Some(progress) = self.progress.try_recv() {
            changed |= self.core.step_run(progress.run, ControlInput::Progress(progress.data), now);
        }
        changed
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(self.core.store().view());
    }
}
