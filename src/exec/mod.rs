// src/exec/mod.rs

//! Worker process supervision.
//!
//! - `worker`: how the worker command is built
//! - `streams`: stdout decoding and stderr logging
//! - `signals`: process-group interrupt and kill
//! - `supervisor`: lifecycle, stop escalation and exit reporting

pub mod signals;
pub mod streams;
pub mod supervisor;
pub mod worker;

pub use supervisor::{Lifecycle, Supervisor, WorkerStatus, STOP_GRACE};
pub use worker::WorkerSpec;
