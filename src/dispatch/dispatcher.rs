//! The collection loop.
//!
//! Frames arrive from a dedicated reader thread over a channel. Each frame
//! is handled completely (lookup, decode, delivery) before the next one is
//! taken, so results reach the sink in stream order.

use std::io::Read;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::outcome::{Diagnostic, DispatchState, Outcome};
use super::pending::PendingSet;
use super::sink::{ResultDecoder, ResultSink};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::FrameError;
use crate::job::JobId;
use crate::protocol::{Frame, FrameEvent, FrameReader, ResultFrame};

/// Snapshot published after every resolved job.
///
/// `resolved` counts every job that left the pending set, including those
/// whose payload failed to decode, so `resolved + outstanding` is always the
/// batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub resolved: usize,
    pub outstanding: usize,
}

/// Matches incoming frames to pending jobs and forwards decoded results.
pub struct ResultDispatcher<D> {
    pending: PendingSet,
    decoder: D,
    state: DispatchState,
    cancel: CancelToken,
    deadline: Option<Duration>,
    poll_interval: Duration,
    progress: Option<Sender<Progress>>,
    resolved: usize,
    delivered: Vec<JobId>,
    diagnostics: Vec<Diagnostic>,
}

impl<D: ResultDecoder> ResultDispatcher<D> {
    pub fn new(pending: PendingSet, decoder: D) -> Self {
        Self {
            pending,
            decoder,
            state: DispatchState::Running,
            cancel: CancelToken::new(),
            deadline: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: None,
            resolved: 0,
            delivered: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Stop waiting for frames once `deadline` has elapsed since `run` began.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Publish a [`Progress`] snapshot after every resolved job.
    ///
    /// Snapshots never block collection: when the channel is full the
    /// snapshot is dropped.
    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Read-only view of the jobs still pending.
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    /// Consume frames until the sentinel, a stream error, cancellation or
    /// the deadline.
    pub fn run<S>(mut self, events: &Receiver<FrameEvent>, sink: &mut S) -> Outcome
    where
        S: ResultSink<D::Output>,
    {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        debug!(pending = self.pending.len(), "Collecting results");

        loop {
            if self.cancel.is_cancelled() {
                info!("Collection cancelled");
                return self.finish(DispatchState::Cancelled, None);
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(
                            outstanding = self.pending.len(),
                            "Deadline reached before all results arrived"
                        );
                        return self.finish(DispatchState::Cancelled, None);
                    }
                    (deadline - now).min(self.poll_interval)
                }
                None => self.poll_interval,
            };

            match events.recv_timeout(wait) {
                Ok(Ok(Frame::Result(frame))) => self.handle_frame(frame, sink),
                Ok(Ok(Frame::EndOfStream)) => {
                    return self.finish(DispatchState::Completed, None);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Result stream failed");
                    return self.finish(DispatchState::Failed, Some(e));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // The reader always publishes a terminal event before
                // hanging up, so this only happens if it panicked.
                Err(RecvTimeoutError::Disconnected) => {
                    return self.finish(DispatchState::Failed, Some(FrameError::UnexpectedEnd));
                }
            }
        }
    }

    fn handle_frame<S>(&mut self, frame: ResultFrame, sink: &mut S)
    where
        S: ResultSink<D::Output>,
    {
        let request_id = frame.request_id;
        let Some(id) = frame
            .job_id()
            .filter(|id| self.pending.resolve(*id).is_some())
        else {
            warn!(request_id, "Result for unknown or already resolved job");
            self.diagnostics
                .push(Diagnostic::UnknownIdentifier { request_id });
            return;
        };
        self.resolved += 1;

        match self.decoder.decode(id, frame.payload) {
            Ok(result) => {
                sink.deliver(id, result);
                self.delivered.push(id);
                debug!(
                    id,
                    outstanding = self.pending.len(),
                    "Result delivered"
                );
            }
            Err(e) => {
                warn!(id, error = %e, "Result payload could not be decoded");
                self.diagnostics.push(Diagnostic::UndecodablePayload {
                    id,
                    reason: e.to_string(),
                });
            }
        }

        if let Some(progress) = &self.progress {
            let snapshot = Progress {
                resolved: self.resolved,
                outstanding: self.pending.len(),
            };
            match progress.try_send(snapshot) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(resolved = self.resolved, "Progress channel full, snapshot dropped");
                }
            }
        }
    }

    fn finish(mut self, state: DispatchState, error: Option<FrameError>) -> Outcome {
        debug!(from = %self.state, to = %state, "Collection finished");
        self.state = state;

        let unresolved = self.pending.outstanding();
        if !unresolved.is_empty() && state != DispatchState::Failed {
            warn!(
                missing = unresolved.len(),
                "Run ended with jobs still pending"
            );
            self.diagnostics.push(Diagnostic::IncompleteBatch {
                missing: unresolved.clone(),
            });
        }

        info!(
            state = %self.state,
            delivered = self.delivered.len(),
            unresolved = unresolved.len(),
            diagnostics = self.diagnostics.len(),
            "Collection summary"
        );

        Outcome {
            state: self.state,
            delivered: self.delivered,
            unresolved,
            diagnostics: self.diagnostics,
            error,
            worker_exit: None,
        }
    }
}

/// Run a dispatcher over any byte stream, reading it on a dedicated thread.
///
/// The reader thread is joined unless the run was cancelled, in which case
/// it is left to finish once its stream closes.
pub fn dispatch_stream<R, D, S>(
    reader: FrameReader<R>,
    dispatcher: ResultDispatcher<D>,
    sink: &mut S,
) -> std::io::Result<Outcome>
where
    R: Read + Send + 'static,
    D: ResultDecoder,
    S: ResultSink<D::Output>,
{
    let thread = reader.spawn("frame-reader")?;
    let outcome = dispatcher.run(thread.events(), sink);
    if outcome.state != DispatchState::Cancelled {
        thread.join();
    }
    Ok(outcome)
}
