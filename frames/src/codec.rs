//! Encode/decode of a single frame to/from one complete byte buffer.
//!
//! Decoding is strict: the buffer must hold exactly one frame, with no
//! trailing bytes and no partial payload.

use crate::{
    DEFAULT_MAX_FRAME_SIZE, Frame, FrameType, HEADER_SIZE, MAGIC, ProtocolError, VERSION,
};

/// Frame codec bound to a negotiated maximum frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    max_frame_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Codec {
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame into a freshly allocated, exact-length buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::KindTooLong`] if the kind exceeds 65535 bytes
    /// and [`ProtocolError::TooLarge`] if the whole frame exceeds the maximum.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let kind = frame.kind().as_bytes();
        let payload = frame.payload();

        let kind_len = u16::try_from(kind.len()).map_err(|_| ProtocolError::KindTooLong(kind.len()))?;
        let size = frame.encoded_len();
        if size > self.max_frame_size {
            return Err(ProtocolError::TooLarge { size, max: self.max_frame_size });
        }
        let payload_len = u32::try_from(payload.len())
            .ok()
            .filter(|len| i32::try_from(*len).is_ok())
            .ok_or(ProtocolError::TooLarge { size, max: self.max_frame_size })?;

        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(frame.frame_type().as_u8());
        out.push(frame.flags());
        out.push(frame.status());
        out.extend_from_slice(&frame.request_id().to_be_bytes());
        out.extend_from_slice(&kind_len.to_be_bytes());
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        debug_assert_eq!(out.len(), size);
        Ok(out)
    }

    /// Decode exactly one frame from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] for empty, truncated, oversized or
    /// malformed input; see the variants for the individual checks.
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame, ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::Empty);
        }
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated { len: bytes.len() });
        }
        if bytes.len() > self.max_frame_size {
            return Err(ProtocolError::TooLarge { size: bytes.len(), max: self.max_frame_size });
        }

        let magic = [bytes[0], bytes[1]];
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        if bytes[2] != VERSION {
            return Err(ProtocolError::UnsupportedVersion(bytes[2]));
        }
        let frame_type = FrameType::from_u8(bytes[3])?;
        let flags = bytes[4];
        let status = bytes[5];
        let request_id = u64::from_be_bytes(read_array(&bytes[6..14]));
        let kind_len = usize::from(u16::from_be_bytes(read_array(&bytes[14..16])));
        let raw_payload_len = u32::from_be_bytes(read_array(&bytes[16..HEADER_SIZE]));
        let payload_len = i32::try_from(raw_payload_len)
            .ok()
            .and_then(|len| usize::try_from(len).ok())
            .ok_or(ProtocolError::PayloadLengthOutOfRange(raw_payload_len))?;

        let declared = HEADER_SIZE + kind_len + payload_len;
        if declared > self.max_frame_size {
            return Err(ProtocolError::TooLarge { size: declared, max: self.max_frame_size });
        }
        let body = &bytes[HEADER_SIZE..];
        if body.len() != kind_len + payload_len {
            return Err(ProtocolError::LengthMismatch { declared: kind_len + payload_len, actual: body.len() });
        }

        let (kind_bytes, payload) = body.split_at(kind_len);
        let kind = std::str::from_utf8(kind_bytes).map_err(|_| ProtocolError::KindEncoding)?;

        Ok(Frame::new(frame_type, flags, status, request_id, kind, payload.to_vec()))
    }
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Encode a frame with the default maximum frame size.
///
/// # Errors
///
/// See [`Codec::encode`].
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    Codec::default().encode(frame)
}

/// Decode a frame with the default maximum frame size.
///
/// # Errors
///
/// See [`Codec::decode`].
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    Codec::default().decode(bytes)
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
