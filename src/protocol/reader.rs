//! Blocking frame decoder and its dedicated reader thread.

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, bounded};

use super::frame::{FIELD_LEN, Frame, ResultFrame, SENTINEL_ID, decode_i32_le};
use crate::error::FrameError;

/// Initial payload allocation cap. Larger payloads grow as bytes arrive so a
/// bogus length cannot force a huge allocation up front.
const MAX_PREALLOC: usize = 64 * 1024;

/// Frames buffered between the reader thread and the dispatcher.
const CHANNEL_CAPACITY: usize = 64;

/// Item published by the reader thread.
pub type FrameEvent = std::result::Result<Frame, FrameError>;

/// Decodes frames from a byte stream, one at a time.
///
/// The reader never consumes bytes beyond the frame it is assembling.
pub struct FrameReader<R> {
    inner: R,
    max_payload: Option<usize>,
    frames_read: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_payload: None,
            frames_read: 0,
        }
    }

    /// Reject frames whose declared length exceeds `limit`.
    pub fn with_max_payload(mut self, limit: Option<usize>) -> Self {
        self.max_payload = limit;
        self
    }

    /// Number of result frames decoded so far (the sentinel is not counted).
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Block until a complete frame, the sentinel, or an error is available.
    pub fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let request_id = match self.read_field("request_id")? {
            Some(id) => id,
            None => return Err(FrameError::UnexpectedEnd),
        };

        if request_id == SENTINEL_ID {
            return Ok(Frame::EndOfStream);
        }

        let length = self
            .read_field("length")?
            .ok_or(FrameError::Truncated {
                field: "length",
                expected: FIELD_LEN,
                received: 0,
            })?;

        if length < 0 {
            return Err(FrameError::NegativeLength { request_id, length });
        }
        let length = length as usize;

        if let Some(limit) = self.max_payload
            && length > limit
        {
            return Err(FrameError::PayloadTooLarge {
                request_id,
                length,
                limit,
            });
        }

        let payload = self.read_payload(length)?;
        self.frames_read += 1;
        Ok(Frame::Result(ResultFrame {
            request_id,
            payload,
        }))
    }

    /// Read one header field. `None` means the stream ended cleanly before it.
    fn read_field(&mut self, field: &'static str) -> Result<Option<i32>, FrameError> {
        let mut buf = [0u8; FIELD_LEN];
        match read_full(&mut self.inner, &mut buf)? {
            0 => Ok(None),
            FIELD_LEN => Ok(Some(decode_i32_le(buf))),
            received => Err(FrameError::Truncated {
                field,
                expected: FIELD_LEN,
                received,
            }),
        }
    }

    fn read_payload(&mut self, length: usize) -> Result<Vec<u8>, FrameError> {
        let mut payload = Vec::with_capacity(length.min(MAX_PREALLOC));
        (&mut self.inner)
            .take(length as u64)
            .read_to_end(&mut payload)?;

        if payload.len() != length {
            return Err(FrameError::Truncated {
                field: "payload",
                expected: length,
                received: payload.len(),
            });
        }
        Ok(payload)
    }
}

impl<R: Read + Send + 'static> FrameReader<R> {
    /// Move the reader onto its own thread, publishing every decoded frame.
    ///
    /// The thread stops after the sentinel, after the first error, or once
    /// the receiving side is dropped.
    pub fn spawn(mut self, name: &str) -> io::Result<ReaderThread> {
        let (tx, rx) = bounded::<FrameEvent>(CHANNEL_CAPACITY);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    let event = self.next_frame();
                    let last = !matches!(event, Ok(Frame::Result(_)));
                    if tx.send(event).is_err() || last {
                        break;
                    }
                }
                tracing::trace!(frames = self.frames_read, "Frame reader thread finished");
            })?;

        Ok(ReaderThread {
            events: rx,
            handle: Some(handle),
        })
    }
}

/// Handle to a running reader thread.
pub struct ReaderThread {
    events: Receiver<FrameEvent>,
    handle: Option<JoinHandle<()>>,
}

impl ReaderThread {
    /// Channel of decoded frames, in stream order.
    pub fn events(&self) -> &Receiver<FrameEvent> {
        &self.events
    }

    /// Wait for the thread to exit.
    ///
    /// Only returns once the underlying stream has ended or failed; callers
    /// that cancel must close the stream (e.g. by terminating the worker)
    /// first.
    pub fn join(self) {
        let ReaderThread { events, handle } = self;
        // A reader blocked on a full channel wakes up once the receiver is gone.
        drop(events);
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("Frame reader thread panicked");
        }
    }
}

/// Fill `buf` as far as the stream allows, returning the bytes read.
///
/// Stops early only at end of stream. Interrupted reads are retried.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
