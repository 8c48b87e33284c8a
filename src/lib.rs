//! jobwire - batch job distribution over a framed subprocess pipe.
//!
//! A batch of [`Job`]s is written to a file, an external worker is launched
//! with that file's path, and the worker answers on its stdout with
//! length-prefixed frames tagged by job id. Results are matched to pending
//! jobs and handed to a caller-supplied sink in arrival order.
//!
//! ```no_run
//! use jobwire::{BatchSession, CollectSink, DispatchConfig, Job, Utf8Decoder};
//!
//! let jobs = Job::sequential(["echo one", "echo two"]);
//! let mut sink = CollectSink::new();
//! let outcome = BatchSession::new(DispatchConfig::default())
//!     .run(&jobs, Utf8Decoder, &mut sink)?;
//! assert!(outcome.is_complete());
//! # Ok::<(), jobwire::JobwireError>(())
//! ```

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod worker;

pub use batch::{BatchEncoder, BatchFormat};
pub use config::DispatchConfig;
pub use dispatch::{
    CancelToken, CollectSink, Diagnostic, DispatchState, Outcome, Progress, RawDecoder,
    ResultDecoder, ResultDispatcher, ResultSink, Utf8Decoder,
};
pub use error::{EncodingError, FrameError, JobwireError, Result};
pub use job::{Job, JobId};
pub use session::{BatchSession, run_batch};
