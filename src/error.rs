//! Error types for jobwire.

use std::io;

use thiserror::Error;

/// Failure while decoding the worker's result stream.
///
/// Every variant is fatal to the collection loop.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Worker closed its output without sending the end-of-stream sentinel")]
    UnexpectedEnd,

    #[error("Truncated frame: {field} needs {expected} bytes, stream ended after {received}")]
    Truncated {
        field: &'static str,
        expected: usize,
        received: usize,
    },

    #[error("Protocol violation: frame {request_id} declares negative length {length}")]
    NegativeLength { request_id: i32, length: i32 },

    #[error("Protocol violation: frame {request_id} declares {length} bytes, limit is {limit}")]
    PayloadTooLarge {
        request_id: i32,
        length: usize,
        limit: usize,
    },

    #[error("Failed to read result stream: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the stream violated the wire format (as opposed to ending early).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::NegativeLength { .. } | Self::PayloadTooLarge { .. })
    }
}

/// Failure while turning a job sequence into a batch.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Job id {0} appears more than once in the batch")]
    DuplicateId(u32),

    #[error("Job id {0} does not fit the wire's signed 32-bit identifier")]
    IdOutOfRange(u32),

    #[error("Line batches require job {expected} at position {expected}, found job {found}")]
    NonSequentialId { expected: u32, found: u32 },

    #[error("Parameters of job {id} cannot be serialized: {reason}")]
    Unserializable { id: u32, reason: String },

    #[error("Malformed batch record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Failed to write batch: {0}")]
    Io(#[from] io::Error),
}

/// Failure while turning a payload into the caller's result type.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Main error type for jobwire.
#[derive(Error, Debug)]
pub enum JobwireError {
    #[error("Failed to launch worker '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Batch encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for jobwire operations.
pub type Result<T> = std::result::Result<T, JobwireError>;
