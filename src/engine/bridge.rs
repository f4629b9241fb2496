// src/engine/bridge.rs

//! Event bridge between the worker-owning side and the presentation side.
//!
//! One independent topic per event kind. Publishing is fire-and-forget over
//! unbounded channels: a slow subscriber never applies backpressure to the
//! worker's stdout reader. Each subscriber gets its own queue, so per-item
//! updates are never lost between publisher and subscriber.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::{
    CompletionReport, ErrorNotice, ProgressSnapshot, RunId, Stamped, StoppedNotice,
    TaskRecord, WorkerEvent,
};

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

struct Topic<T> {
    kind: &'static str,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<T>)>>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push((id, tx));

        let weak: Weak<dyn Detach> = Arc::downgrade(self) as Weak<dyn Detach>;
        Subscription {
            rx,
            handle: Unsubscribe {
                id,
                topic: weak,
            },
            active: true,
        }
    }

    /// Returns how many subscribers received the value.
    fn publish(&self, value: T) -> usize {
        let mut subs = self.lock();
        subs.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        trace!(kind = self.kind, delivered = subs.len(), "published");
        subs.len()
    }

    fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<T>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Detach for Topic<T> {
    fn detach(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Handle that stops delivery to one subscription.
///
/// Cloneable and safe to call any number of times, from any thread, even
/// after the bridge is gone.
#[derive(Clone)]
pub struct Unsubscribe {
    id: u64,
    topic: Weak<dyn Detach>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.detach(self.id);
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}

/// Receiving end of one topic.
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: Unsubscribe,
    active: bool,
}

impl<T> Subscription<T> {
    /// Next value, or `None` once unsubscribed or the bridge is gone.
    pub async fn recv(&mut self) -> Option<T> {
        if !self.active {
            return None;
        }
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        if !self.active {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// A detached handle that can cancel this subscription from elsewhere.
    pub fn handle(&self) -> Unsubscribe {
        self.handle.clone()
    }

    /// Stop delivery. Values still queued are discarded.
    pub fn unsubscribe(&mut self) {
        self.handle.unsubscribe();
        if self.active {
            self.active = false;
            self.rx.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.handle.id)
            .field("active", &self.active)
            .finish()
    }
}

/// Per-kind fan-out of worker events and lifecycle notices.
pub struct EventBridge {
    progress: Arc<Topic<Stamped<ProgressSnapshot>>>,
    task: Arc<Topic<Stamped<TaskRecord>>>,
    complete: Arc<Topic<Stamped<CompletionReport>>>,
    error: Arc<Topic<Stamped<ErrorNotice>>>,
    stopped: Arc<Topic<StoppedNotice>>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("progress", &self.progress.subscriber_count())
            .field("task", &self.task.subscriber_count())
            .field("complete", &self.complete.subscriber_count())
            .field("error", &self.error.subscriber_count())
            .field("stopped", &self.stopped.subscriber_count())
            .finish()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            progress: Topic::new("progress"),
            task: Topic::new("task"),
            complete: Topic::new("complete"),
            error: Topic::new("error"),
            stopped: Topic::new("stopped"),
        }
    }

    pub fn on_progress(&self) -> Subscription<Stamped<ProgressSnapshot>> {
        self.progress.subscribe()
    }

    pub fn on_task_update(&self) -> Subscription<Stamped<TaskRecord>> {
        self.task.subscribe()
    }

    pub fn on_complete(&self) -> Subscription<Stamped<CompletionReport>> {
        self.complete.subscribe()
    }

    pub fn on_error(&self) -> Subscription<Stamped<ErrorNotice>> {
        self.error.subscribe()
    }

    pub fn on_stopped(&self) -> Subscription<StoppedNotice> {
        self.stopped.subscribe()
    }

    /// Route a decoded worker event to its topic.
    pub fn publish(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(p) => {
                self.progress.publish(p);
            }
            WorkerEvent::Task(t) => {
                self.task.publish(t);
            }
            WorkerEvent::Complete(c) => {
                self.complete.publish(c);
            }
            WorkerEvent::Error(e) => {
                self.error.publish(e);
            }
        }
    }

    /// Publish an error raised by the supervisor itself for `run`.
    pub fn publish_error(&self, run: RunId, notice: ErrorNotice) {
        self.error.publish(Stamped::now(notice).in_run(run));
    }

    pub fn publish_stopped(&self, notice: StoppedNotice) {
        self.stopped.publish(notice);
    }
}
