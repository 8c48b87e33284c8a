//! jobwire - run a batch of jobs through a worker process.

mod cli;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::{Cli, Commands, RunArgs, WorkerArgs};
use jobwire::logging::{self, LogConfig};
use jobwire::worker::{WorkerOptions, run_worker};
use jobwire::{BatchSession, DispatchConfig, Job, JobId, Outcome, RawDecoder, ResultSink};

/// Exit status when some jobs never produced a result.
const EXIT_PARTIAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Worker(args) => cmd_worker(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!(
                "{}: {}",
                "error"
                    .if_supports_color(Stderr, |text| text.red())
                    .if_supports_color(Stderr, |text| text.bold()),
                e
            );
            for cause in e.chain().skip(1) {
                eprintln!(
                    "  {}: {}",
                    "caused by".if_supports_color(Stderr, |text| text.yellow()),
                    cause
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    logging::init(log_config(cli, |key| std::env::var(key).ok()));
}

/// Explicit flags win over RUST_LOG and the JOBWIRE_LOG_* variables.
fn log_config(cli: &Cli, var: impl Fn(&str) -> Option<String>) -> LogConfig {
    let mut config = LogConfig::from_verbosity(cli.verbose, cli.quiet).with_ansi(!cli.no_color);
    if cli.verbose > 0 || cli.quiet {
        let level = config.level.to_string().to_lowercase();
        config = config.with_filter(level);
    }
    config = config.with_overrides_from(var);
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    if let Some(path) = &cli.log_file {
        config = config.with_file(path.clone());
    }
    config
}

fn cmd_run(args: &RunArgs) -> Result<ExitCode> {
    let text = fs::read_to_string(&args.jobs_file)
        .with_context(|| format!("Failed to read jobs file {}", args.jobs_file.display()))?;
    let jobs = Job::parse_lines(&text);
    if jobs.is_empty() {
        bail!("No jobs found in {}", args.jobs_file.display());
    }

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let mut config = DispatchConfig::new()
        .with_batch_format(args.format.into())
        .with_batch_path(&args.batch_file)
        .with_grace_period(Duration::from_millis(args.grace_ms))
        .with_max_payload(args.max_payload)
        .with_trailing_args(&args.dependencies);
    if let Some(worker) = &args.worker {
        config = config.with_worker(worker, &args.worker_args);
    }
    if let Some(secs) = args.timeout {
        let deadline = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid timeout: {}", secs))?;
        config = config.with_deadline(Some(deadline));
    }

    let session = BatchSession::new(config);
    let token = session.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl+C handler")?;

    let mut sink = OutputSink::new(args.output_dir.clone());
    let outcome = session.run(&jobs, RawDecoder, &mut sink)?;

    if let Some(e) = sink.error {
        return Err(e).context("Failed to write job output");
    }

    print_summary(&outcome);

    if let Some(e) = outcome.error {
        return Err(e).context(format!(
            "Result stream failed after {} of {} jobs",
            outcome.delivered.len(),
            jobs.len()
        ));
    }
    if outcome.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL))
    }
}

fn cmd_worker(args: &WorkerArgs) -> Result<ExitCode> {
    let mut options = WorkerOptions::new(&args.batch_file);
    options.format = args.format.into();
    options.dependencies = args.dependencies.clone();
    options.max_retries = args.retries;
    if let Some(jobs) = args.jobs {
        options.parallelism = jobs.max(1);
    }

    let summary = run_worker(&options)
        .with_context(|| format!("Failed to run batch {}", args.batch_file.display()))?;
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Batch finished"
    );
    Ok(ExitCode::SUCCESS)
}

/// Writes results to `<dir>/<id>.out`, or reports their size on stdout.
struct OutputSink {
    dir: Option<PathBuf>,
    error: Option<io::Error>,
}

impl OutputSink {
    fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, error: None }
    }
}

impl ResultSink<Vec<u8>> for OutputSink {
    fn deliver(&mut self, id: JobId, result: Vec<u8>) {
        if self.error.is_some() {
            return;
        }
        match &self.dir {
            Some(dir) => {
                let path = dir.join(format!("{}.out", id));
                if let Err(e) = fs::write(&path, &result) {
                    tracing::error!(id, path = %path.display(), error = %e, "Failed to write result");
                    self.error = Some(e);
                }
            }
            None => println!("job {}: {} bytes", id, result.len()),
        }
    }
}

fn print_summary(outcome: &Outcome) {
    for diagnostic in &outcome.diagnostics {
        eprintln!(
            "{}: {}",
            "warning".if_supports_color(Stderr, |text| text.yellow()),
            diagnostic
        );
    }

    let status = if outcome.is_complete() {
        format!("{}", outcome.state.if_supports_color(Stderr, |text| text.green()))
    } else {
        format!("{}", outcome.state.if_supports_color(Stderr, |text| text.red()))
    };
    eprintln!(
        "{}: {} delivered, {} unresolved",
        status,
        outcome.delivered.len(),
        outcome.unresolved.len()
    );

    if !outcome.unresolved.is_empty() {
        let ids: Vec<String> = outcome.unresolved.iter().map(|id| id.to_string()).collect();
        eprintln!("unresolved jobs: {}", ids.join(", "));
    }
    if let Some(reason) = &outcome.worker_exit {
        eprintln!("worker {}", reason);
    }
}
