// src/protocol/mod.rs

//! Worker wire protocol.
//!
//! The worker writes one JSON envelope per line on stdout:
//!
//! ```text
//! {"type":"progress","timestamp":1718000000000,"data":{"total":10,"completed":3,...}}
//! {"type":"task","data":{"id":"task-0003","index":3,"status":"running",...}}
//! {"type":"complete","data":{"total":10,"success":9,"failed":1,"elapsed":42.5,"failedTasks":[...]}}
//! {"type":"error","message":"service unreachable","code":2}
//! ```
//!
//! - [`model`] holds the typed payloads shared by the rest of the crate.
//! - [`decoder`] turns lines (or a whole async stream) into [`WorkerEvent`]s.

pub mod decoder;
pub mod model;

pub use decoder::{decode_line, decode_stream, DecodeStats, DecodedLine};
pub use model::{
    task_id_for_index, CompletionReport, ErrorNotice, FailedTaskRef, ProgressSnapshot, RunId,
    Stamped, StoppedNotice, TaskRecord, TaskStatus, WorkerEvent,
};
