//! Result stream wire format.
//!
//! The worker answers on its stdout with a sequence of frames:
//!
//! ```text
//! +----------------+----------------+------------------+
//! | request_id i32 |   length i32   | payload (length) |
//! +----------------+----------------+------------------+
//! ```
//!
//! Integers are little-endian. A `request_id` of `-1` is the end-of-stream
//! sentinel and carries neither length nor payload; it is the only way a
//! well-behaved worker ends the stream.

mod frame;
mod reader;
mod writer;

pub use frame::{FIELD_LEN, Frame, ResultFrame, SENTINEL_ID, decode_i32_le, encode_frame};
pub use reader::{FrameEvent, FrameReader, ReaderThread};
pub use writer::FrameWriter;
