// src/engine/throttle.rs

//! Delivery policies for high-frequency worker events.
//!
//! Both policies are clock-driven state machines with no timers of their
//! own: callers pass `now`, and sleep until [`deadline`] to fire the single
//! outstanding trailing edge. The control runtime drives them from its
//! `select!` loop; tests drive them with Tokio's paused clock or with
//! hand-built instants.
//!
//! [`deadline`]: CoalescingThrottle::deadline

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::protocol::TaskRecord;

/// Window for aggregate progress snapshots.
pub const PROGRESS_WINDOW: Duration = Duration::from_millis(100);

/// Window for per-task updates.
pub const TASK_BATCH_WINDOW: Duration = Duration::from_millis(50);

/// Leading-edge throttle that keeps only the latest value per window.
///
/// Intermediate values between a leading edge and the trailing flush are
/// discarded, which is only acceptable for full-aggregate payloads.
#[derive(Debug)]
pub struct CoalescingThrottle<T> {
    window: Duration,
    last_delivery: Option<Instant>,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> CoalescingThrottle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_delivery: None,
            pending: None,
            deadline: None,
        }
    }

    /// Offer a value; returns it back if it should be delivered right away.
    ///
    /// A leading-edge delivery drops any pending trailing value, since that
    /// value is older than the one being delivered.
    pub fn offer(&mut self, value: T, now: Instant) -> Option<T> {
        let next_allowed = self.last_delivery.map(|last| last + self.window);
        match next_allowed {
            Some(at) if now < at => {
                self.pending = Some(value);
                if self.deadline.is_none() {
                    self.deadline = Some(at);
                }
                None
            }
            _ => {
                self.last_delivery = Some(now);
                self.pending = None;
                self.deadline = None;
                Some(value)
            }
        }
    }

    /// When the trailing edge is due, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Fire the trailing edge if its deadline has passed.
    pub fn poll_expired(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(at) if now >= at => self.flush(now),
            _ => None,
        }
    }

    /// Forget the pending value and the last delivery time.
    pub fn clear(&mut self) {
        self.last_delivery = None;
        self.pending = None;
        self.deadline = None;
    }

    /// Deliver the pending value immediately, regardless of the deadline.
    pub fn flush(&mut self, now: Instant) -> Option<T> {
        self.deadline = None;
        let value = self.pending.take()?;
        self.last_delivery = Some(now);
        Some(value)
    }
}

/// Identity used to collapse updates inside one batch.
pub trait BatchKey {
    fn batch_key(&self) -> &str;
}

impl BatchKey for TaskRecord {
    fn batch_key(&self) -> &str {
        &self.id
    }
}

/// Accumulating batch that never drops an update.
///
/// The first update arms a flush `window` later; everything that arrives
/// before then is delivered together. Updates sharing a key collapse into
/// the slot of the first one, carrying the latest value, which is exactly
/// what applying them in order with last-write-wins would produce.
#[derive(Debug)]
pub struct PreservingBatcher<T> {
    window: Duration,
    buffer: Vec<T>,
    slots: HashMap<String, usize>,
    deadline: Option<Instant>,
}

impl<T: BatchKey> PreservingBatcher<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: Vec::new(),
            slots: HashMap::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        match self.slots.get(value.batch_key()) {
            Some(&slot) => self.buffer[slot] = value,
            None => {
                self.slots.insert(value.batch_key().to_string(), self.buffer.len());
                self.buffer.push(value);
            }
        }
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Deliver the batch if its deadline has passed.
    pub fn poll_expired(&mut self, now: Instant) -> Option<Vec<T>> {
        match self.deadline {
            Some(at) if now >= at => self.flush(),
            _ => None,
        }
    }

    /// Drop everything buffered without delivering it.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.slots.clear();
        self.deadline = None;
    }

    /// Deliver whatever is buffered right now.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.deadline = None;
        self.slots.clear();
        if self.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }
}
