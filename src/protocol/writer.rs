//! Frame encoder used by the worker side of the protocol.

use std::io::{self, Write};

use super::frame::SENTINEL_ID;

/// Writes result frames and the closing sentinel, flushing after each one
/// so the reading side sees results as soon as they are produced.
pub struct FrameWriter<W: Write> {
    inner: W,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write one result frame.
    pub fn write_frame(&mut self, request_id: i32, payload: &[u8]) -> io::Result<()> {
        if request_id == SENTINEL_ID {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "request id -1 is reserved for the end-of-stream sentinel",
            ));
        }
        let length = i32::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes exceeds the frame limit", payload.len()),
            )
        })?;

        self.inner.write_all(&request_id.to_le_bytes())?;
        self.inner.write_all(&length.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the end-of-stream sentinel.
    pub fn write_sentinel(&mut self) -> io::Result<()> {
        self.inner.write_all(&SENTINEL_ID.to_le_bytes())?;
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, FrameReader, ResultFrame};
    use std::io::Cursor;

    #[test]
    fn test_writer_output_decodes() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(3, b"done").unwrap();
        writer.write_frame(1, b"").unwrap();
        writer.write_sentinel().unwrap();
        assert_eq!(writer.frames_written(), 2);

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        assert_eq!(
            reader.next_frame().unwrap(),
            Frame::Result(ResultFrame::new(3, b"done".to_vec()))
        );
        assert_eq!(
            reader.next_frame().unwrap(),
            Frame::Result(ResultFrame::new(1, Vec::new()))
        );
        assert_eq!(reader.next_frame().unwrap(), Frame::EndOfStream);
    }

    #[test]
    fn test_writer_rejects_sentinel_id() {
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer.write_frame(-1, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(writer.into_inner().is_empty());
    }
}
