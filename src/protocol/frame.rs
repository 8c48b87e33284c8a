//! Frame types and integer codec.

use crate::job::JobId;

/// Width of the `request_id` and `length` header fields.
pub const FIELD_LEN: usize = 4;

/// `request_id` value reserved for the end-of-stream sentinel.
pub const SENTINEL_ID: i32 = -1;

/// One decoded result message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFrame {
    pub request_id: i32,
    pub payload: Vec<u8>,
}

impl ResultFrame {
    pub fn new(request_id: i32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            payload: payload.into(),
        }
    }

    /// The job this frame answers, if the identifier is a valid job id.
    pub fn job_id(&self) -> Option<JobId> {
        JobId::try_from(self.request_id).ok()
    }
}

/// Outcome of reading one frame from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Result(ResultFrame),
    EndOfStream,
}

/// Decode a little-endian two's-complement `i32`.
pub fn decode_i32_le(bytes: [u8; FIELD_LEN]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// Encode a complete result frame into a byte vector.
///
/// Panics if the payload is longer than `i32::MAX` bytes.
pub fn encode_frame(request_id: i32, payload: &[u8]) -> Vec<u8> {
    let length = i32::try_from(payload.len()).expect("payload exceeds i32::MAX bytes");
    let mut out = Vec::with_capacity(2 * FIELD_LEN + payload.len());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_non_negative_values() {
        for n in [0i32, 1, 255, 256, 65_535, 1 << 24, 0x1234_5678, i32::MAX] {
            assert_eq!(decode_i32_le(n.to_le_bytes()), n);
        }
    }

    #[test]
    fn test_decode_treats_bytes_unsigned() {
        // 0xFF in the low byte must not sign-extend into the higher bytes.
        assert_eq!(decode_i32_le([0xFF, 0x00, 0x00, 0x00]), 255);
        assert_eq!(decode_i32_le([0x80, 0x80, 0x00, 0x00]), 0x8080);
    }

    #[test]
    fn test_decode_sentinel() {
        assert_eq!(decode_i32_le([0xFF; 4]), SENTINEL_ID);
    }

    #[test]
    fn test_encode_frame_layout() {
        let bytes = encode_frame(2, b"xyz");
        assert_eq!(bytes, [2, 0, 0, 0, 3, 0, 0, 0, b'x', b'y', b'z']);
    }

    #[test]
    fn test_job_id_rejects_negative() {
        assert_eq!(ResultFrame::new(7, Vec::new()).job_id(), Some(7));
        assert_eq!(ResultFrame::new(-3, Vec::new()).job_id(), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every non-negative value survives the little-endian codec.
        #[test]
        fn decode_round_trips_non_negative(n in 0..=i32::MAX) {
            prop_assert_eq!(decode_i32_le(n.to_le_bytes()), n);
        }

        /// Frame headers carry the id and payload length verbatim.
        #[test]
        fn encode_frame_header_matches(
            id in 0..=i32::MAX,
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let bytes = encode_frame(id, &payload);
            prop_assert_eq!(decode_i32_le(bytes[0..4].try_into().unwrap()), id);
            prop_assert_eq!(
                decode_i32_le(bytes[4..8].try_into().unwrap()) as usize,
                payload.len()
            );
            prop_assert_eq!(&bytes[8..], payload.as_slice());
        }
    }
}
