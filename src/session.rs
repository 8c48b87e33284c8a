//! One complete batch run: encode, launch, collect, reap.

use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{info, instrument, warn};

use crate::batch::BatchEncoder;
use crate::config::DispatchConfig;
use crate::dispatch::{
    CancelToken, DispatchState, Outcome, PendingSet, Progress, ResultDecoder, ResultDispatcher,
    ResultSink,
};
use crate::error::{JobwireError, Result};
use crate::job::Job;
use crate::protocol::FrameReader;
use crate::worker::{WorkerCommand, spawn_worker};

/// Drives a worker through a batch of jobs.
///
/// Encoding problems and launch failures are returned as errors before any
/// result can be delivered. Everything after launch, including a broken
/// result stream, is reported through the [`Outcome`].
pub struct BatchSession {
    config: DispatchConfig,
    cancel: CancelToken,
    progress: Option<Sender<Progress>>,
}

impl BatchSession {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Token that stops the current or next run when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[instrument(level = "debug", skip_all, fields(jobs = jobs.len()))]
    pub fn run<D, S>(&self, jobs: &[Job], decoder: D, sink: &mut S) -> Result<Outcome>
    where
        D: ResultDecoder,
        S: ResultSink<D::Output>,
    {
        let config = &self.config;

        BatchEncoder::new(config.batch_format).write_file(&config.batch_path, jobs)?;
        let pending = PendingSet::from(jobs);

        let command = WorkerCommand::from_config(config)?;
        let mut worker = spawn_worker(&command, &config.batch_path)?;
        let stdout = worker
            .take_stdout()
            .ok_or_else(|| JobwireError::Worker("Worker output already taken".into()))?;

        let reader = FrameReader::new(stdout)
            .with_max_payload(config.max_payload)
            .spawn("frame-reader")?;

        let mut dispatcher = ResultDispatcher::new(pending, decoder)
            .with_cancel_token(self.cancel.clone())
            .with_deadline(config.deadline)
            .with_poll_interval(config.poll_interval);
        if let Some(progress) = &self.progress {
            dispatcher = dispatcher.with_progress(progress.clone());
        }

        let mut outcome = dispatcher.run(reader.events(), sink);

        // After the sentinel the worker may still be cleaning up. In every
        // other case its output is no longer wanted.
        let grace = match outcome.state {
            DispatchState::Completed => config.grace_period,
            _ => Duration::ZERO,
        };
        match worker.shutdown(grace) {
            Ok(reason) => {
                info!(pid = worker.pid(), reason = %reason, "Worker exited");
                outcome.worker_exit = Some(reason);
            }
            Err(e) => warn!(pid = worker.pid(), error = %e, "Failed to reap worker"),
        }

        // The worker's end of the pipe is closed now, so the reader cannot
        // stay blocked.
        reader.join();
        Ok(outcome)
    }
}

/// Run `jobs` once with a fresh session.
pub fn run_batch<D, S>(
    config: DispatchConfig,
    jobs: &[Job],
    decoder: D,
    sink: &mut S,
) -> Result<Outcome>
where
    D: ResultDecoder,
    S: ResultSink<D::Output>,
{
    BatchSession::new(config).run(jobs, decoder, sink)
}
