//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use jobwire::batch::BatchFormat;
use jobwire::config::DEFAULT_BATCH_FILENAME;
use jobwire::logging::LogFormat;
use jobwire::worker::worker_main::DEFAULT_MAX_RETRIES;

/// Run a batch of jobs through a worker process and collect its results.
#[derive(Parser, Debug)]
#[command(name = "jobwire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, value_enum, env = "JOBWIRE_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Also write logs to this file.
    #[arg(long, value_name = "PATH", env = "JOBWIRE_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every line of a jobs file through a worker.
    Run(RunArgs),

    /// Built-in worker: execute a batch file and answer on stdout.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// File with one job per line. Empty lines are skipped.
    pub jobs_file: PathBuf,

    /// Worker executable (default: this binary's built-in worker).
    #[arg(short, long, env = "JOBWIRE_WORKER")]
    pub worker: Option<PathBuf>,

    /// Argument passed to the worker before the batch file path (repeatable).
    #[arg(long = "worker-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Batch file layout the worker expects.
    #[arg(short, long, value_enum, default_value_t = BatchFormatArg::Lines, env = "JOBWIRE_BATCH_FORMAT")]
    pub format: BatchFormatArg,

    /// Where to write the batch file.
    #[arg(long, env = "JOBWIRE_BATCH_FILE", default_value = DEFAULT_BATCH_FILENAME)]
    pub batch_file: PathBuf,

    /// Stop waiting for results after this many seconds.
    #[arg(short, long, value_name = "SECS", env = "JOBWIRE_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Milliseconds the worker may take to exit after its last result.
    #[arg(long, value_name = "MS", default_value_t = 5000, env = "JOBWIRE_GRACE_MS")]
    pub grace_ms: u64,

    /// Reject results larger than this many bytes.
    #[arg(long, value_name = "BYTES", env = "JOBWIRE_MAX_PAYLOAD")]
    pub max_payload: Option<usize>,

    /// Write each result to <DIR>/<id>.out instead of summarizing it.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Paths passed to the worker after the batch file, such as files the jobs depend on.
    #[arg(last = true, value_name = "DEPENDENCIES")]
    pub dependencies: Vec<String>,
}

/// Arguments for the built-in worker.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Batch file to execute.
    pub batch_file: PathBuf,

    /// Files or directories that must exist before any job runs.
    pub dependencies: Vec<PathBuf>,

    /// Batch file layout.
    #[arg(short, long, value_enum, default_value_t = BatchFormatArg::Lines)]
    pub format: BatchFormatArg,

    /// Commands run in parallel (default: half the CPUs, at most 8).
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Extra attempts for a command that fails.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub retries: u32,
}

/// Batch file layout.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchFormatArg {
    /// One command per line, id = line index.
    #[default]
    Lines,
    /// One JSON object per line.
    Jsonl,
}

impl From<BatchFormatArg> for BatchFormat {
    fn from(arg: BatchFormatArg) -> Self {
        match arg {
            BatchFormatArg::Lines => BatchFormat::Lines,
            BatchFormatArg::Jsonl => BatchFormat::JsonLines,
        }
    }
}

/// Log output format.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
