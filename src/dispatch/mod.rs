//! Result collection.
//!
//! A [`ResultDispatcher`] owns the set of pending jobs for one run. It reads
//! [`FrameEvent`](crate::protocol::FrameEvent)s from a reader thread, resolves
//! each frame against the pending set, decodes the payload and hands it to a
//! [`ResultSink`]. The run ends in one of three terminal states:
//!
//! - `Completed`: the worker sent the end-of-stream sentinel
//! - `Failed`: the stream broke (truncation, premature EOF, bad length)
//! - `Cancelled`: the caller's [`CancelToken`] fired or the deadline passed
//!
//! In every case the [`Outcome`] lists the jobs that never got a result.

mod cancel;
mod dispatcher;
mod outcome;
mod pending;
mod sink;

pub use cancel::CancelToken;
pub use dispatcher::{Progress, ResultDispatcher, dispatch_stream};
pub use outcome::{Diagnostic, DispatchState, Outcome};
pub use pending::PendingSet;
pub use sink::{CollectSink, RawDecoder, ResultDecoder, ResultSink, Utf8Decoder};
