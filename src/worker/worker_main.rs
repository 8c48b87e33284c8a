//! Built-in worker.
//!
//! Runs when `jobwire worker <batch-file>` is invoked. Every job's
//! parameters are run as a shell command; each command that exits
//! successfully is answered with a frame carrying its stdout, in completion
//! order. A failed command is retried with a doubling delay; one that still
//! fails produces no frame. Once every command has finished the
//! end-of-stream sentinel is written.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;

use crate::batch::{BatchFormat, read_batch_file};
use crate::error::{JobwireError, Result};
use crate::job::Job;
use crate::protocol::FrameWriter;

/// Extra attempts for a failed command.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Delay before the first retry; doubles on each further attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Options for the built-in worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub batch_path: PathBuf,
    pub format: BatchFormat,
    /// Files or directories the batch needs; all must exist before any job runs.
    pub dependencies: Vec<PathBuf>,
    /// Commands run concurrently.
    pub parallelism: usize,
    /// Shell used to run each command.
    pub shell: PathBuf,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl WorkerOptions {
    pub fn new(batch_path: impl Into<PathBuf>) -> Self {
        Self {
            batch_path: batch_path.into(),
            format: BatchFormat::Lines,
            dependencies: Vec::new(),
            parallelism: default_parallelism(),
            shell: PathBuf::from("sh"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Half the available CPUs, between 1 and 8.
pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| (n.get() / 2).clamp(1, 8))
        .unwrap_or(2)
}

/// What the worker did with its batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Result of running one command.
struct CommandResult {
    id: i32,
    output: Option<Vec<u8>>,
}

/// Read the batch and answer it on stdout.
pub fn run_worker(options: &WorkerOptions) -> Result<WorkerSummary> {
    check_dependencies(&options.dependencies)?;
    let jobs = read_batch_file(&options.batch_path, options.format)?;
    tracing::debug!(
        jobs = jobs.len(),
        parallelism = options.parallelism,
        "Worker loaded batch"
    );

    let stdout = io::stdout().lock();
    Ok(execute_jobs(jobs, options, stdout)?)
}

fn check_dependencies(dependencies: &[PathBuf]) -> Result<()> {
    for path in dependencies {
        if !path.exists() {
            return Err(JobwireError::Worker(format!(
                "Dependency {} does not exist",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "Dependency present");
    }
    Ok(())
}

/// Run `jobs` and write a frame per successful command, then the sentinel.
pub fn execute_jobs<W: Write>(
    jobs: Vec<Job>,
    options: &WorkerOptions,
    out: W,
) -> io::Result<WorkerSummary> {
    let mut writer = FrameWriter::new(out);
    let mut summary = WorkerSummary::default();

    let (job_tx, job_rx) = unbounded::<Job>();
    let (result_tx, result_rx) = unbounded::<CommandResult>();

    for job in jobs {
        if i32::try_from(job.id).is_err() {
            tracing::warn!(id = job.id, "Skipping job with id outside the wire range");
            summary.failed += 1;
            continue;
        }
        // Receiver is alive for the whole function.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|scope| -> io::Result<()> {
        for _ in 0..options.parallelism.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for job in job_rx.iter() {
                    let result = run_command(options, &job);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for result in result_rx.iter() {
            match result.output {
                Some(payload) => {
                    writer.write_frame(result.id, &payload)?;
                    summary.succeeded += 1;
                }
                None => summary.failed += 1,
            }
        }
        Ok(())
    })?;

    writer.write_sentinel()?;
    Ok(summary)
}

fn run_command(options: &WorkerOptions, job: &Job) -> CommandResult {
    let id = job.id as i32;
    let output = retry_with_backoff(options.max_retries, options.retry_delay, id, || {
        attempt_command(&options.shell, job)
    });
    let output = match output {
        Ok(stdout) => Some(stdout),
        Err(e) => {
            tracing::warn!(id, error = %e, "Job command failed, giving up");
            None
        }
    };
    CommandResult { id, output }
}

fn attempt_command(shell: &Path, job: &Job) -> std::result::Result<Vec<u8>, String> {
    let out = Command::new(shell)
        .arg("-c")
        .arg(&job.params)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| format!("failed to start: {}", e))?;
    if out.status.success() {
        Ok(out.stdout)
    } else {
        Err(format!("exited with {}", out.status))
    }
}

/// Run `operation` up to `max_retries + 1` times, sleeping `base_delay * 2^n`
/// between attempts. Returns the last error once attempts run out.
fn retry_with_backoff<T, E, F>(
    max_retries: u32,
    base_delay: Duration,
    id: i32,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> std::result::Result<T, E>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                let delay = base_delay.saturating_mul(1u32 << attempt.min(16));
                tracing::warn!(
                    id,
                    attempt = attempt + 1,
                    attempts = max_retries + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Job command failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, FrameReader};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn collect(bytes: Vec<u8>) -> HashMap<i32, Vec<u8>> {
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut results = HashMap::new();
        loop {
            match reader.next_frame().expect("valid stream") {
                Frame::Result(frame) => {
                    assert!(results.insert(frame.request_id, frame.payload).is_none());
                }
                Frame::EndOfStream => return results,
            }
        }
    }

    #[test]
    fn test_execute_jobs_answers_successful_commands() {
        let jobs = Job::sequential(["printf one", "printf two", "exit 4", "printf ''"]);
        let mut options = WorkerOptions::new("unused");
        options.parallelism = 2;

        let mut out = Vec::new();
        let summary = execute_jobs(jobs, &options, &mut out).unwrap();
        assert_eq!(
            summary,
            WorkerSummary {
                succeeded: 3,
                failed: 1
            }
        );

        let results = collect(out);
        assert_eq!(results.len(), 3);
        assert_eq!(results[&0], b"one");
        assert_eq!(results[&1], b"two");
        assert_eq!(results[&3], b"");
        assert!(!results.contains_key(&2));
    }

    #[test]
    fn test_execute_empty_batch_writes_sentinel() {
        let options = WorkerOptions::new("unused");
        let mut out = Vec::new();
        execute_jobs(Vec::new(), &options, &mut out).unwrap();
        assert_eq!(out, (-1i32).to_le_bytes());
    }

    #[test]
    fn test_missing_shell_counts_as_failure() {
        let mut options = WorkerOptions::new("unused");
        options.shell = PathBuf::from("/nonexistent/shell");

        let mut out = Vec::new();
        let summary = execute_jobs(Job::sequential(["true"]), &options, &mut out).unwrap();
        assert_eq!(summary.failed, 1);
        assert!(collect(out).is_empty());
    }

    fn options_without_delay() -> WorkerOptions {
        let mut options = WorkerOptions::new("unused");
        options.retry_delay = Duration::from_millis(1);
        options
    }

    #[test]
    fn test_flaky_command_is_retried() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("tried");
        let command = format!(
            "test -f '{0}' || {{ : > '{0}'; exit 1; }}; printf ok",
            marker.display()
        );

        let mut out = Vec::new();
        let summary =
            execute_jobs(Job::sequential([command]), &options_without_delay(), &mut out).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(collect(out)[&0], b"ok");
    }

    #[test]
    fn test_retries_are_bounded() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("count");
        let command = format!("echo x >> '{}'; exit 1", counter.display());

        let mut options = options_without_delay();
        options.max_retries = 3;
        let mut out = Vec::new();
        let summary = execute_jobs(Job::sequential([command]), &options, &mut out).unwrap();

        assert_eq!(summary.failed, 1);
        assert!(collect(out).is_empty());
        let runs = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(runs.lines().count(), 4);
    }

    #[test]
    fn test_zero_retries_runs_once() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("tried");
        let command = format!(
            "test -f '{0}' || {{ : > '{0}'; exit 1; }}; printf ok",
            marker.display()
        );

        let mut options = options_without_delay();
        options.max_retries = 0;
        let mut out = Vec::new();
        let summary = execute_jobs(Job::sequential([command]), &options, &mut out).unwrap();
        assert_eq!(summary.failed, 1);
        assert!(marker.exists());
    }

    #[test]
    fn test_retry_with_backoff_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), String> =
            retry_with_backoff(2, Duration::ZERO, 0, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            });
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_missing_dependency_stops_worker() {
        let dir = tempdir().unwrap();
        let batch = dir.path().join("batch.txt");
        std::fs::write(&batch, "printf hi\n").unwrap();

        let mut options = WorkerOptions::new(&batch);
        options.dependencies = vec![dir.path().join("no-such-dep.py")];
        let err = run_worker(&options).unwrap_err();
        assert!(err.to_string().contains("no-such-dep.py"));
    }

    #[test]
    fn test_present_dependencies_pass() {
        let dir = tempdir().unwrap();
        let dep = dir.path().join("worker.py");
        std::fs::write(&dep, "").unwrap();
        assert!(check_dependencies(&[dep, dir.path().to_path_buf()]).is_ok());
    }

    #[test]
    fn test_default_parallelism_bounds() {
        let n = default_parallelism();
        assert!((1..=8).contains(&n));
    }
}
