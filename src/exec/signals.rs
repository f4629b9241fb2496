// src/exec/signals.rs

//! Signal delivery to the worker's process group.
//!
//! The worker is spawned as the leader of its own process group, so its
//! pid doubles as the group id and one `killpg` reaches the shell, the
//! worker and anything they started.

use anyhow::Result;

/// How a signal reached the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered to the whole process group.
    Group,
    /// Group delivery failed; only the worker itself was signalled.
    ProcessOnly,
    /// Process groups are not available on this platform.
    Unsupported,
}

#[cfg(unix)]
mod imp {
    use anyhow::{Context, Result};
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tracing::{debug, warn};

    use super::Delivery;

    pub fn send(pid: u32, signal: Signal) -> Result<Delivery> {
        let pid = Pid::from_raw(pid as i32);
        match killpg(pid, signal) {
            Ok(()) => {
                debug!(pgid = %pid, ?signal, "signalled worker process group");
                Ok(Delivery::Group)
            }
            Err(group_err) => {
                warn!(
                    pgid = %pid,
                    ?signal,
                    error = %group_err,
                    "process group signal failed; signalling worker only"
                );
                kill(pid, signal).with_context(|| format!("sending {signal:?} to worker {pid}"))?;
                Ok(Delivery::ProcessOnly)
            }
        }
    }

    pub fn interrupt(pid: u32) -> Result<Delivery> {
        send(pid, Signal::SIGINT)
    }

    pub fn kill_hard(pid: u32) -> Result<Delivery> {
        send(pid, Signal::SIGKILL)
    }
}

#[cfg(not(unix))]
mod imp {
    use anyhow::Result;

    use super::Delivery;

    pub fn interrupt(_pid: u32) -> Result<Delivery> {
        Ok(Delivery::Unsupported)
    }

    pub fn kill_hard(_pid: u32) -> Result<Delivery> {
        Ok(Delivery::Unsupported)
    }
}

/// Ask the worker's process group to interrupt (SIGINT).
pub fn interrupt(pid: u32) -> Result<Delivery> {
    imp::interrupt(pid)
}

/// Unconditionally kill the worker's process group (SIGKILL).
pub fn kill_hard(pid: u32) -> Result<Delivery> {
    imp::kill_hard(pid)
}
