//! Final report of a collection run.

use std::fmt;

use crate::error::FrameError;
use crate::job::JobId;
use crate::worker::TerminationReason;

/// Collection loop state.
///
/// `Running` is the only non-terminal state. Every other state ends the run
/// and is reported together with the jobs left pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    /// The worker sent the end-of-stream sentinel.
    Completed,
    /// The result stream broke.
    Failed,
    /// The caller cancelled or the deadline passed.
    Cancelled,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A recoverable anomaly noticed during collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A frame named a job that is not pending: unknown, or already resolved.
    UnknownIdentifier { request_id: i32 },
    /// A frame resolved its job but the payload could not be decoded.
    UndecodablePayload { id: JobId, reason: String },
    /// The run ended with jobs still pending.
    IncompleteBatch { missing: Vec<JobId> },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIdentifier { request_id } => {
                write!(f, "result for unknown or already resolved job {}", request_id)
            }
            Self::UndecodablePayload { id, reason } => {
                write!(f, "result for job {} could not be decoded: {}", id, reason)
            }
            Self::IncompleteBatch { missing } => {
                write!(f, "{} job(s) never received a result", missing.len())
            }
        }
    }
}

/// Everything the caller learns from a run, besides the results themselves
/// (which were already handed to the sink).
#[derive(Debug)]
pub struct Outcome {
    pub state: DispatchState,
    /// Jobs forwarded to the sink, in arrival order.
    pub delivered: Vec<JobId>,
    /// Jobs still pending when the run ended, ascending.
    pub unresolved: Vec<JobId>,
    pub diagnostics: Vec<Diagnostic>,
    /// The stream error that ended a failed run.
    pub error: Option<FrameError>,
    /// How the worker exited, when a worker was involved.
    pub worker_exit: Option<TerminationReason>,
}

impl Outcome {
    /// Sentinel received and every job answered.
    pub fn is_complete(&self) -> bool {
        self.state == DispatchState::Completed && self.unresolved.is_empty()
    }

    /// Run ended without error but some jobs are missing results.
    pub fn is_partial(&self) -> bool {
        self.state != DispatchState::Failed && !self.unresolved.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.state == DispatchState::Failed
    }

    /// Identifiers reported as unknown, in arrival order.
    pub fn unknown_identifiers(&self) -> Vec<i32> {
        self.diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::UnknownIdentifier { request_id } => Some(*request_id),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(state: DispatchState, unresolved: Vec<JobId>) -> Outcome {
        Outcome {
            state,
            delivered: Vec::new(),
            unresolved,
            diagnostics: Vec::new(),
            error: None,
            worker_exit: None,
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert!(outcome(DispatchState::Completed, vec![]).is_complete());
        assert!(outcome(DispatchState::Completed, vec![3]).is_partial());
        assert!(outcome(DispatchState::Cancelled, vec![3]).is_partial());
        assert!(!outcome(DispatchState::Cancelled, vec![]).is_complete());

        let failed = outcome(DispatchState::Failed, vec![3]);
        assert!(failed.is_failed());
        assert!(!failed.is_partial());
    }

    #[test]
    fn test_state_terminality() {
        assert!(!DispatchState::Running.is_terminal());
        assert!(DispatchState::Completed.is_terminal());
        assert!(DispatchState::Failed.is_terminal());
        assert!(DispatchState::Cancelled.is_terminal());
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::UnknownIdentifier { request_id: 7 };
        assert!(d.to_string().contains('7'));

        let d = Diagnostic::IncompleteBatch {
            missing: vec![1, 2],
        };
        assert!(d.to_string().starts_with("2 job(s)"));
    }

    #[test]
    fn test_unknown_identifiers_filter() {
        let mut o = outcome(DispatchState::Completed, vec![]);
        o.diagnostics = vec![
            Diagnostic::UnknownIdentifier { request_id: 7 },
            Diagnostic::IncompleteBatch { missing: vec![1] },
            Diagnostic::UnknownIdentifier { request_id: -4 },
        ];
        assert_eq!(o.unknown_identifiers(), vec![7, -4]);
    }
}
