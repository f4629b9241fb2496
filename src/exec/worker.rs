// src/exec/worker.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::RunConfig;

/// How to launch the worker.
///
/// `command` is a shell command line, run through `sh -c` (`cmd /C` on
/// Windows), e.g. `python scrape_asyncio.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub command: String,
    pub working_dir: Option<PathBuf>,
}

impl WorkerSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build the process command with `cfg` injected as environment.
    ///
    /// stdout and stderr are piped; on Unix the child leads a new process
    /// group so the whole tree can be signalled at once.
    pub fn build_command(&self, cfg: &RunConfig) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.envs(cfg.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}
