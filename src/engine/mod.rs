// src/engine/mod.rs

//! Presentation-side engine for scrapedeck.
//!
//! This module ties together:
//! - the per-kind event bridge fed by the supervisor
//! - the two delivery policies (coalescing throttle, preserving batch)
//! - the task reconciliation store
//! - the control runtime that owns the store and applies events to it
//!
//! The pure core lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`].

pub mod bridge;
pub mod core;
pub mod runtime;
pub mod store;
pub mod throttle;

pub use bridge::{EventBridge, Subscription, Unsubscribe};
pub use core::{ControlCore, ControlInput, ControlOptions, StoreCommand};
pub use runtime::{ControlHandle, ControlRuntime};
pub use store::{
    LedgerView, Page, PresentationState, StatusCounts, TaskFilter, TaskLedger, TaskStore,
    MAX_TASKS,
};
pub use throttle::{
    BatchKey, CoalescingThrottle, PreservingBatcher, PROGRESS_WINDOW, TASK_BATCH_WINDOW,
};
