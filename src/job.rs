//! Job descriptors handed to the worker.

use serde::{Deserialize, Serialize};

/// Identifier of a job within a batch.
///
/// Results come back tagged with this value as a little-endian `i32`,
/// so only `0..=i32::MAX` is usable.
pub type JobId = u32;

/// Largest identifier the result stream can carry.
pub const MAX_JOB_ID: JobId = i32::MAX as JobId;

/// A single unit of work: an identifier plus the opaque parameters the
/// worker needs to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub params: String,
}

impl Job {
    pub fn new(id: JobId, params: impl Into<String>) -> Self {
        Self {
            id,
            params: params.into(),
        }
    }

    /// Build jobs from a list of parameter strings, numbering them from zero.
    ///
    /// This is the numbering the line batch format uses.
    pub fn sequential<I, S>(params: I) -> Vec<Job>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        params
            .into_iter()
            .enumerate()
            .map(|(i, p)| Job::new(i as JobId, p))
            .collect()
    }

    /// Read job parameters from text, one per line, skipping empty lines.
    ///
    /// Only zero-length lines are skipped; a line of whitespace is a job.
    pub fn parse_lines(text: &str) -> Vec<Job> {
        Self::sequential(text.lines().filter(|line| !line.is_empty()))
    }
}
