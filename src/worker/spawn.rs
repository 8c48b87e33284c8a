//! Worker subprocess spawning.
//!
//! The worker gets the batch file path after its own arguments, followed by
//! any trailing arguments, and answers on its stdout. It is placed in its own
//! process group so that terminating it
//! also reaches any commands it started.

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::proc::WorkerHandle;
use crate::batch::BatchFormat;
use crate::config::DispatchConfig;
use crate::error::{JobwireError, Result};

/// Subcommand the binary uses for its built-in worker.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// How to invoke the worker, minus the batch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    /// Arguments before the batch path.
    pub args: Vec<OsString>,
    /// Arguments after the batch path.
    pub trailing_args: Vec<OsString>,
}

impl WorkerCommand {
    /// An external worker executable.
    pub fn external<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            trailing_args: Vec::new(),
        }
    }

    pub fn with_trailing_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.trailing_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// The current executable running its built-in worker.
    pub fn built_in(format: BatchFormat) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| JobwireError::Worker(format!("Failed to get current executable: {}", e)))?;
        Ok(Self::external(
            exe,
            [
                WORKER_SUBCOMMAND.to_string(),
                "--format".to_string(),
                format.to_string(),
            ],
        ))
    }

    /// Resolve the worker named by a dispatch configuration.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        let command = match &config.worker_program {
            Some(program) => Self::external(program, config.worker_args.iter().cloned()),
            None => Self::built_in(config.batch_format)?,
        };
        Ok(command.with_trailing_args(config.trailing_args.iter().cloned()))
    }

    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Spawn a worker subprocess for the given batch file.
///
/// Failure to start the executable is a [`JobwireError::Launch`].
pub fn spawn_worker(command: &WorkerCommand, batch_path: &Path) -> Result<WorkerHandle> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    cmd.arg(batch_path);
    cmd.args(&command.trailing_args);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit()); // Worker diagnostics go to our stderr

    cmd.process_group(0);

    let child = cmd.spawn().map_err(|source| JobwireError::Launch {
        program: command.display_name(),
        source,
    })?;

    tracing::info!(
        pid = child.id(),
        program = %command.display_name(),
        batch = %batch_path.display(),
        "Worker started"
    );

    WorkerHandle::from_child(child, command.display_name())
}
