//! Exit analysis for worker processes.
//!
//! A worker's exit status is diagnostic only: the sentinel frame, not the
//! exit code, decides whether a run succeeded.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Killed by a signal number nix does not know about.
    UnknownSignal(i32),
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Whether the process was stopped by the escalation signals we send.
    pub fn was_terminated(&self) -> bool {
        matches!(self, Self::Signaled(Signal::SIGTERM | Signal::SIGKILL))
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::UnknownSignal(sig) => format!("killed by signal {}", sig),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze an `ExitStatus` to determine the termination reason.
pub fn analyze_exit_status(status: ExitStatus) -> TerminationReason {
    if let Some(code) = status.code() {
        return TerminationReason::Exited(code);
    }
    match status.signal() {
        Some(raw) => Signal::try_from(raw)
            .map(TerminationReason::Signaled)
            .unwrap_or(TerminationReason::UnknownSignal(raw)),
        None => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_reason_success() {
        assert!(TerminationReason::Exited(0).is_success());
        assert!(!TerminationReason::Exited(1).is_success());
        assert!(!TerminationReason::Signaled(Signal::SIGKILL).is_success());
    }

    #[test]
    fn test_was_terminated() {
        assert!(TerminationReason::Signaled(Signal::SIGTERM).was_terminated());
        assert!(TerminationReason::Signaled(Signal::SIGKILL).was_terminated());
        assert!(!TerminationReason::Signaled(Signal::SIGSEGV).was_terminated());
        assert!(!TerminationReason::Exited(0).was_terminated());
    }

    #[test]
    fn test_analyze_exit_status() {
        // Raw wait statuses: exit code lives in the second byte, signal in the low bits.
        assert_eq!(
            analyze_exit_status(ExitStatus::from_raw(0)),
            TerminationReason::Exited(0)
        );
        assert_eq!(
            analyze_exit_status(ExitStatus::from_raw(3 << 8)),
            TerminationReason::Exited(3)
        );
        assert_eq!(
            analyze_exit_status(ExitStatus::from_raw(Signal::SIGTERM as i32)),
            TerminationReason::Signaled(Signal::SIGTERM)
        );
    }

    #[test]
    fn test_description() {
        assert_eq!(TerminationReason::Exited(2).to_string(), "exited with code 2");
        assert!(
            TerminationReason::Signaled(Signal::SIGKILL)
                .to_string()
                .contains("SIGKILL")
        );
    }
}
