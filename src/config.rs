//! Runtime configuration for a dispatch session.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::BatchFormat;

/// Default time a worker gets to exit on its own after the sentinel.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How often the collection loop wakes up to check for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default batch file name, created in the working directory.
pub const DEFAULT_BATCH_FILENAME: &str = "batch_file.txt";

/// Configuration for launching a worker and collecting its results.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Worker executable. `None` launches the current executable in worker mode.
    pub worker_program: Option<PathBuf>,
    /// Arguments placed before the batch file path.
    pub worker_args: Vec<OsString>,
    /// Arguments placed after the batch file path, such as dependency files.
    pub trailing_args: Vec<OsString>,
    /// Layout of the batch file the worker reads.
    pub batch_format: BatchFormat,
    /// Where the batch file is written.
    pub batch_path: PathBuf,
    /// Give up waiting for results after this long.
    pub deadline: Option<Duration>,
    /// How long a worker may take to exit after the stream ends.
    pub grace_period: Duration,
    /// Cancellation check interval while waiting for frames.
    pub poll_interval: Duration,
    /// Largest payload accepted from the worker.
    pub max_payload: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_program: None,
            worker_args: Vec::new(),
            trailing_args: Vec::new(),
            batch_format: BatchFormat::Lines,
            batch_path: PathBuf::from(DEFAULT_BATCH_FILENAME),
            deadline: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_payload: None,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an external worker program.
    pub fn with_worker<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.worker_program = Some(program.into());
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments the worker receives after the batch file path.
    pub fn with_trailing_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.trailing_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch_format(mut self, format: BatchFormat) -> Self {
        self.batch_format = format;
        self
    }

    pub fn with_batch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.batch_path = path.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_payload(mut self, limit: Option<usize>) -> Self {
        self.max_payload = limit;
        self
    }
}
