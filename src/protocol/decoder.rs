// src/protocol/decoder.rs

//! Line decoder for the worker's stdout protocol.
//!
//! Every line is parsed on its own. Lines that are not JSON envelopes are
//! plain diagnostic output from the worker (it prints human-readable logs
//! alongside the protocol) and are never treated as errors.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::logging::WORKER_TARGET;
use crate::protocol::model::{
    now_millis, CompletionReport, ErrorNotice, ProgressSnapshot, Stamped, TaskRecord,
    WorkerEvent,
};

/// Result of decoding a single non-blank line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// A protocol record.
    Event(WorkerEvent),
    /// Not a protocol record; the worker's own log output.
    Diagnostic(String),
    /// A well-formed envelope with a kind this decoder does not handle.
    Unknown(String),
    /// A known kind whose payload did not match its schema.
    Malformed { kind: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i32>,
}

/// Decode one line of worker output.
///
/// Returns `None` for blank lines.
pub fn decode_line(line: &str) -> Option<DecodedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let envelope: Envelope = match serde_json::from_str(trimmed) {
        Ok(env) => env,
        Err(_) => return Some(DecodedLine::Diagnostic(line.trim_end().to_string())),
    };

    let timestamp = envelope
        .timestamp
        .filter(|ts| ts.is_finite() && *ts >= 0.0)
        .map(|ts| ts as u64)
        .unwrap_or_else(now_millis);

    let decoded = match envelope.kind.as_str() {
        "progress" => payload::<ProgressSnapshot>(&envelope).map(|p| {
            WorkerEvent::Progress(Stamped::new(timestamp, p.normalize()))
        }),
        "task" => payload::<TaskRecord>(&envelope)
            .map(|t| WorkerEvent::Task(Stamped::new(timestamp, t.normalize()))),
        "complete" => payload::<CompletionReport>(&envelope)
            .map(|c| WorkerEvent::Complete(Stamped::new(timestamp, c))),
        "error" => error_notice(&envelope).map(|e| WorkerEvent::Error(Stamped::new(timestamp, e))),
        other => return Some(DecodedLine::Unknown(other.to_string())),
    };

    Some(match decoded {
        Ok(event) => DecodedLine::Event(event),
        Err(reason) => DecodedLine::Malformed {
            kind: envelope.kind,
            reason,
        },
    })
}

fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, String> {
    let data = envelope
        .data
        .clone()
        .ok_or_else(|| "missing `data` field".to_string())?;
    serde_json::from_value(data).map_err(|e| e.to_string())
}

fn error_notice(envelope: &Envelope) -> Result<ErrorNotice, String> {
    if let Some(message) = &envelope.message {
        return Ok(ErrorNotice {
            message: message.clone(),
            code: envelope.code,
        });
    }
    // Some workers nest the notice under `data` like the other kinds.
    payload::<ErrorNotice>(envelope)
}

/// Counters returned once a stream has been fully decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub events: usize,
    pub diagnostics: usize,
    pub skipped: usize,
}

/// Read `reader` to the end, handing each decoded event to `on_event`.
///
/// Partial reads are buffered until a newline arrives; a final line without
/// a trailing newline is still decoded. Invalid UTF-8 is replaced rather
/// than aborting the stream.
pub async fn decode_stream<R, F>(reader: R, mut on_event: F) -> std::io::Result<DecodeStats>
where
    R: AsyncRead + Unpin,
    F: FnMut(WorkerEvent),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    let mut stats = DecodeStats::default();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        match decode_line(&line) {
            None => {}
            Some(DecodedLine::Event(event)) => {
                debug!(kind = event.kind(), "decoded worker event");
                stats.events += 1;
                on_event(event);
            }
            Some(DecodedLine::Diagnostic(text)) => {
                stats.diagnostics += 1;
                info!(target: WORKER_TARGET, "{}", text);
            }
            Some(DecodedLine::Unknown(kind)) => {
                stats.skipped += 1;
                debug!(%kind, "ignoring record with unknown type");
            }
            Some(DecodedLine::Malformed { kind, reason }) => {
                stats.skipped += 1;
                warn!(%kind, %reason, "skipping malformed worker record");
            }
        }
    }

    Ok(stats)
}
