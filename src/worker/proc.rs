//! Process handle for a running worker.

use std::process::{Child, ChildStdout};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use super::signals::{TerminationReason, analyze_exit_status};
use crate::error::{JobwireError, Result};

/// How often exit is polled while waiting out a grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time a worker gets after SIGTERM before SIGKILL.
const TERM_TIMEOUT: Duration = Duration::from_millis(100);

/// A running worker subprocess and its output stream.
///
/// The handle is the only owner of the process. Dropping it without calling
/// [`WorkerHandle::shutdown`] kills and reaps the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
    stdout: Option<ChildStdout>,
    program: String,
    exit: Option<TerminationReason>,
}

impl WorkerHandle {
    /// Wrap a spawned child whose stdout was captured.
    pub fn from_child(mut child: Child, program: String) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobwireError::Worker("Child stdout not captured".into()))?;

        Ok(Self {
            child,
            stdout: Some(stdout),
            program,
            exit: None,
        })
    }

    /// Get the process ID.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Hand the result stream to its reader. Returns `None` once taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Exit reason, if the worker has been reaped.
    pub fn exit_reason(&self) -> Option<&TerminationReason> {
        self.exit.as_ref()
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Try to reap the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<TerminationReason>> {
        if let Some(reason) = &self.exit {
            return Ok(Some(reason.clone()));
        }
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(self.record_exit(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(JobwireError::Worker(format!("waitpid failed: {}", e))),
        }
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<TerminationReason> {
        if let Some(reason) = &self.exit {
            return Ok(reason.clone());
        }
        let status = self
            .child
            .wait()
            .map_err(|e| JobwireError::Worker(format!("waitpid failed: {}", e)))?;
        Ok(self.record_exit(status))
    }

    /// Send SIGTERM to the worker's process group.
    pub fn terminate(&self) -> Result<()> {
        self.signal_group(Signal::SIGTERM)
    }

    /// Send SIGKILL to the worker's process group and reap the worker.
    pub fn kill(&mut self) -> Result<TerminationReason> {
        self.signal_group(Signal::SIGKILL)?;
        self.wait()
    }

    /// Give the worker `grace` to exit on its own, then escalate to SIGTERM
    /// and finally SIGKILL.
    pub fn shutdown(&mut self, grace: Duration) -> Result<TerminationReason> {
        if let Some(reason) = self.wait_timeout(grace)? {
            return Ok(reason);
        }

        tracing::warn!(
            pid = self.pid(),
            grace_ms = grace.as_millis() as u64,
            "Worker did not exit within grace period, sending SIGTERM"
        );
        self.terminate()?;
        if let Some(reason) = self.wait_timeout(TERM_TIMEOUT)? {
            return Ok(reason);
        }

        tracing::warn!(pid = self.pid(), "Worker ignored SIGTERM, sending SIGKILL");
        self.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<TerminationReason>> {
        let start = Instant::now();
        loop {
            if let Some(reason) = self.try_wait()? {
                return Ok(Some(reason));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn signal_group(&self, sig: Signal) -> Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        // The worker leads its own process group (see spawn_worker).
        let pgid = Pid::from_raw(self.child.id() as i32);
        match signal::killpg(pgid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(JobwireError::Worker(format!(
                "Failed to send {:?}: {}",
                sig, e
            ))),
        }
    }

    fn record_exit(&mut self, status: std::process::ExitStatus) -> TerminationReason {
        let reason = analyze_exit_status(status);
        tracing::debug!(pid = self.child.id(), reason = %reason, "Worker reaped");
        self.exit = Some(reason.clone());
        reason
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            // Try graceful termination
            let _ = self.terminate();
            std::thread::sleep(EXIT_POLL_INTERVAL);

            // Check if it exited
            if let Ok(Some(_)) = self.try_wait() {
                return;
            }

            // Force kill
            let _ = self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::spawn::{WorkerCommand, spawn_worker};
    use std::path::Path;

    fn spawn_sh(script: &str) -> WorkerHandle {
        let command = WorkerCommand::external("sh", ["-c", script]);
        spawn_worker(&command, Path::new("unused")).expect("Failed to spawn sh")
    }

    #[test]
    fn test_wait_reports_exit_code() {
        let mut handle = spawn_sh("exit 3");
        assert_eq!(handle.wait().unwrap(), TerminationReason::Exited(3));
        assert!(!handle.is_running());
        assert_eq!(handle.exit_reason(), Some(&TerminationReason::Exited(3)));
    }

    #[test]
    fn test_take_stdout_once() {
        let mut handle = spawn_sh("exit 0");
        assert!(handle.take_stdout().is_some());
        assert!(handle.take_stdout().is_none());
        handle.wait().unwrap();
    }

    #[test]
    fn test_shutdown_returns_natural_exit() {
        let mut handle = spawn_sh("exit 0");
        let reason = handle.shutdown(Duration::from_secs(5)).unwrap();
        assert!(reason.is_success());
    }

    #[test]
    fn test_shutdown_escalates_to_sigterm() {
        let mut handle = spawn_sh("sleep 60");
        assert!(handle.is_running());

        let start = Instant::now();
        let reason = handle.shutdown(Duration::from_millis(50)).unwrap();
        assert!(reason.was_terminated(), "unexpected reason: {}", reason);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_shutdown_escalates_to_sigkill() {
        let mut handle = spawn_sh("trap '' TERM; while :; do sleep 1; done");
        // Give the shell time to install the trap.
        std::thread::sleep(Duration::from_millis(200));

        let reason = handle.shutdown(Duration::from_millis(20)).unwrap();
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGKILL));
    }

    #[test]
    fn test_drop_reaps_worker() {
        let handle = spawn_sh("sleep 60");
        let pid = Pid::from_raw(handle.pid() as i32);
        drop(handle);

        // Reaped and gone: signalling it fails with ESRCH.
        assert_eq!(signal::kill(pid, None), Err(Errno::ESRCH));
    }
}
