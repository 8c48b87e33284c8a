//! Result decoding and delivery to the caller.

use crate::error::DecodeError;
use crate::job::JobId;

/// Turns a frame payload into the caller's result type.
pub trait ResultDecoder {
    type Output;

    fn decode(&self, id: JobId, payload: Vec<u8>) -> Result<Self::Output, DecodeError>;
}

/// Passes payload bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ResultDecoder for RawDecoder {
    type Output = Vec<u8>;

    fn decode(&self, _id: JobId, payload: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
        Ok(payload)
    }
}

/// Interprets payloads as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

impl ResultDecoder for Utf8Decoder {
    type Output = String;

    fn decode(&self, _id: JobId, payload: Vec<u8>) -> Result<String, DecodeError> {
        String::from_utf8(payload).map_err(|e| DecodeError(e.to_string()))
    }
}

/// Receives each resolved job exactly once.
pub trait ResultSink<T> {
    fn deliver(&mut self, id: JobId, result: T);
}

impl<T, F> ResultSink<T> for F
where
    F: FnMut(JobId, T),
{
    fn deliver(&mut self, id: JobId, result: T) {
        self(id, result)
    }
}

/// Sink that keeps every result in arrival order.
#[derive(Debug, Clone)]
pub struct CollectSink<T> {
    pub results: Vec<(JobId, T)>,
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.results.iter().map(|(id, _)| *id).collect()
    }
}

impl<T> ResultSink<T> for CollectSink<T> {
    fn deliver(&mut self, id: JobId, result: T) {
        self.results.push((id, result));
    }
}
