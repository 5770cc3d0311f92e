//! Shared frame model and binary codec for the ECWS/1 protocol.
//!
//! This crate owns the wire representation used by both the client engine and
//! the `server` dispatcher. It performs no I/O: one WebSocket binary message
//! carries exactly one frame, and reassembly is the transport's job.
//!
//! WIRE LAYOUT
//! ===========
//! ```text
//! magic0 magic1 version type flags status request_id kind_len payload_len kind    payload
//! 1      1      1       1    1     1      8 (BE)     2 (BE)   4 (BE)      kind_len payload_len
//! ```
//! The fixed header is [`HEADER_SIZE`] bytes.

mod codec;
mod kind;

pub use codec::{Codec, decode_frame, encode_frame};
pub use kind::{split_kind, validate_kind};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Protocol-identifying leading bytes.
pub const MAGIC: [u8; 2] = [0xEC, 0x57];

/// The single wire version understood by this revision.
pub const VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 20;

/// Maximum UTF-8 length of a `kind`, bounded by its 2-byte length prefix.
pub const MAX_KIND_LEN: usize = u16::MAX as usize;

/// Default negotiated maximum frame size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Well-known RESPONSE status codes. Any nonzero value is a failure; handlers
/// may use their own codes beyond these.
pub mod status {
    /// Success.
    pub const OK: u8 = 0;
    /// The handler failed unexpectedly.
    pub const INTERNAL: u8 = 1;
    /// No handler is registered for the request kind.
    pub const UNKNOWN_KIND: u8 = 2;
    /// The request payload was rejected by the handler.
    pub const BAD_REQUEST: u8 = 3;
}

// =============================================================================
// ERRORS
// =============================================================================

/// Frame-format or kind-syntax violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Input buffer was empty.
    #[error("empty frame")]
    Empty,
    /// Input buffer is shorter than the fixed header.
    #[error("truncated frame: {len} bytes is shorter than the {HEADER_SIZE}-byte header")]
    Truncated { len: usize },
    /// Frame is larger than the negotiated maximum.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },
    /// Leading bytes are not the protocol magic.
    #[error("bad magic bytes {0:02x?}")]
    BadMagic([u8; 2]),
    /// Version byte is not supported by this revision.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// Type byte does not map to a known frame type.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),
    /// Declared payload length does not fit a signed 32-bit length.
    #[error("payload length {0} is out of range")]
    PayloadLengthOutOfRange(u32),
    /// Bytes after the header do not match the declared lengths.
    #[error("length mismatch: header declares {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    /// Encoded kind exceeds [`MAX_KIND_LEN`].
    #[error("kind is {0} bytes, maximum is {MAX_KIND_LEN}")]
    KindTooLong(usize),
    /// Kind bytes are not valid UTF-8.
    #[error("kind is not valid UTF-8")]
    KindEncoding,
    /// Kind does not follow `namespace:path` syntax.
    #[error("invalid kind {kind:?}: {reason}")]
    InvalidKind { kind: String, reason: &'static str },
    /// A text (or other non-binary) message arrived where a binary frame is mandatory.
    #[error("non-binary message received")]
    NonBinaryMessage,
}

// =============================================================================
// TYPES
// =============================================================================

/// Discriminant carried in the header `type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Request = 1,
    Response = 2,
    Event = 3,
    Heartbeat = 4,
}

impl FrameType {
    /// Wire byte for this frame type.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a frame type from its wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownFrameType`] for unmapped bytes.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Request),
            2 => Ok(Self::Response),
            3 => Ok(Self::Event),
            4 => Ok(Self::Heartbeat),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

/// One discrete protocol message.
///
/// Fields are private: a frame is immutable once built. Builders consume
/// `self` and return a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    flags: u8,
    status: u8,
    request_id: u64,
    kind: String,
    payload: Vec<u8>,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Frame {
    /// Build a frame from raw parts. `kind` and `payload` may be empty.
    pub fn new(
        frame_type: FrameType,
        flags: u8,
        status: u8,
        request_id: u64,
        kind: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self { frame_type, flags, status, request_id, kind: kind.into(), payload: payload.into() }
    }

    /// Create a request frame awaiting a RESPONSE with the same `request_id`.
    pub fn request(request_id: u64, kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Request, 0, status::OK, request_id, kind, payload)
    }

    /// Create a fire-and-forget event frame (`request_id` 0).
    pub fn event(kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Event, 0, status::OK, 0, kind, payload)
    }

    /// Create a heartbeat frame: `request_id` 0, empty kind and payload.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat, 0, status::OK, 0, String::new(), Vec::new())
    }

    /// Create a successful RESPONSE to this frame. Inherits `request_id` and `kind`.
    #[must_use]
    pub fn reply(&self, payload: impl Into<Vec<u8>>) -> Self {
        self.respond(status::OK, payload.into())
    }

    /// Create a failed RESPONSE carrying `message` as its UTF-8 payload.
    ///
    /// A `status` of zero is promoted to [`status::INTERNAL`] so the reply is
    /// never mistaken for success.
    #[must_use]
    pub fn error_reply(&self, status: u8, message: impl Into<String>) -> Self {
        let status = if status == status::OK { status::INTERNAL } else { status };
        self.respond(status, message.into().into_bytes())
    }

    fn respond(&self, status: u8, payload: Vec<u8>) -> Self {
        Self::new(FrameType::Response, 0, status, self.request_id, self.kind.clone(), payload)
    }

    /// Return a copy of this frame with `flags` replaced.
    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame and return its payload buffer.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total encoded size of this frame in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.kind.len() + self.payload.len()
    }

    /// `true` for a RESPONSE with a nonzero status.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.frame_type == FrameType::Response && self.status != status::OK
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
