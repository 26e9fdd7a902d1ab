//! Error types for the binary frame protocol.
//!
//! Every failure here is local to the frame (or request) being processed.
//! The session layer turns them into a terminal outcome; nothing in the
//! protocol layer retries.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A header field does not fit in its 4-bit slot
    #[error("Encoding error: header field `{field}` value {value} exceeds 15")]
    Encoding { field: &'static str, value: u8 },

    /// The frame is shorter than its own declared layout
    #[error("Truncated frame: needed {needed} bytes, only {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    /// Header size of zero words cannot hold the fixed header
    #[error("Invalid header size: {0} (must be at least 1)")]
    InvalidHeaderSize(u8),

    /// Compression code outside {None, Gzip}
    #[error("Unsupported compression method: {0:#x}")]
    UnsupportedCompression(u8),

    /// Serialization code outside {None, JSON}
    #[error("Unsupported serialization method: {0:#x}")]
    UnsupportedSerialization(u8),

    /// Corrupt compressed data or non UTF-8 text
    #[error("Decode error: {0}")]
    Decode(String),

    /// Request envelope could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Message type outside the recognized server set
    #[error("Protocol error: unrecognized message type {0:#x}")]
    UnknownMessageType(u8),

    /// Request payload does not fit the 4-byte length prefix
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}
