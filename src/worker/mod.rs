//! Worker subprocess lifecycle.
//!
//! The worker is an opaque producer: it is started with the batch file path,
//! writes frames to its stdout at its own pace and is reaped once the stream
//! ends.
//!
//! ```text
//!   ┌──────────────┐  batch file path   ┌──────────────┐
//!   │   jobwire    │ ─────────────────► │    worker    │
//!   │ (dispatcher) │ ◄───────────────── │  (process)   │
//!   └──────────────┘   framed stdout    └──────────────┘
//! ```
//!
//! - **Launch**: [`spawn_worker`] starts the process in its own group
//! - **Supervision**: [`WorkerHandle`] polls, terminates and reaps it
//! - **Built-in worker**: [`worker_main`] runs batch lines as shell commands

mod proc;
mod signals;
mod spawn;
pub mod worker_main;

pub use proc::WorkerHandle;
pub use signals::{TerminationReason, analyze_exit_status};
pub use spawn::{WORKER_SUBCOMMAND, WorkerCommand, spawn_worker};
pub use worker_main::{WorkerOptions, WorkerSummary, run_worker};
