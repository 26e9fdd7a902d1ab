//! Fixed 4-byte frame header and the variable header-extension region.
//!
//! ```text
//! Byte 0: [version:4][header_size:4]
//! Byte 1: [message_type:4][flags:4]
//! Byte 2: [serialization:4][compression:4]
//! Byte 3: reserved
//! Bytes [4, header_size*4): header extensions (opaque)
//! Bytes [header_size*4, end): payload
//! ```

use std::fmt;

use super::error::{ProtocolError, ProtocolResult};

/// Size of the fixed header in bytes.
pub const FIXED_HEADER_LEN: usize = 4;

/// Header size is counted in 4-byte words.
pub const HEADER_WORD_LEN: usize = 4;

/// Protocol version emitted by this client.
pub const PROTOCOL_VERSION: u8 = 0b0001;

const NIBBLE_MAX: u8 = 0x0f;

// =============================================================================
// Header Field Codes
// =============================================================================

/// Message type carried in the high nibble of byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client request carrying a full serialized envelope (0x1)
    FullClientRequest,
    /// Server frame carrying raw audio bytes (0xb)
    AudioOnlyResponse,
    /// Server frame carrying frontend diagnostic data (0xc)
    FrontendResponse,
    /// Server error frame (0xf)
    ErrorResponse,
    /// Any other code
    Unknown(u8),
}

impl MessageType {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0x1 => MessageType::FullClientRequest,
            0xb => MessageType::AudioOnlyResponse,
            0xc => MessageType::FrontendResponse,
            0xf => MessageType::ErrorResponse,
            other => MessageType::Unknown(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            MessageType::FullClientRequest => 0x1,
            MessageType::AudioOnlyResponse => 0xb,
            MessageType::FrontendResponse => 0xc,
            MessageType::ErrorResponse => 0xf,
            MessageType::Unknown(value) => value,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::FullClientRequest => write!(f, "full client request"),
            MessageType::AudioOnlyResponse => write!(f, "audio-only server response"),
            MessageType::FrontendResponse => write!(f, "frontend server response"),
            MessageType::ErrorResponse => write!(f, "error message from server"),
            MessageType::Unknown(value) => write!(f, "unknown message type {value:#x}"),
        }
    }
}

/// Message-type specific flags (low nibble of byte 1).
///
/// For audio responses these describe whether a sequence number follows
/// the header and whether it marks the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFlags {
    /// No sequence number (0)
    NoSequence,
    /// Sequence number > 0 (1)
    PositiveSequence,
    /// Last message from the server, sequence number < 0 (2)
    LastNegativeSequence,
    /// Sequence number < 0 (3)
    NegativeSequence,
    /// Any other code
    Unknown(u8),
}

impl MessageFlags {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0 => MessageFlags::NoSequence,
            1 => MessageFlags::PositiveSequence,
            2 => MessageFlags::LastNegativeSequence,
            3 => MessageFlags::NegativeSequence,
            other => MessageFlags::Unknown(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            MessageFlags::NoSequence => 0,
            MessageFlags::PositiveSequence => 1,
            MessageFlags::LastNegativeSequence => 2,
            MessageFlags::NegativeSequence => 3,
            MessageFlags::Unknown(value) => value,
        }
    }

    /// Whether a sequence number precedes the payload.
    pub fn has_sequence(self) -> bool {
        self != MessageFlags::NoSequence
    }
}

impl fmt::Display for MessageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFlags::NoSequence => write!(f, "no sequence number"),
            MessageFlags::PositiveSequence => write!(f, "sequence number > 0"),
            MessageFlags::LastNegativeSequence => {
                write!(f, "last message from server (seq < 0)")
            }
            MessageFlags::NegativeSequence => write!(f, "sequence number < 0"),
            MessageFlags::Unknown(value) => write!(f, "unknown flags {value:#x}"),
        }
    }
}

/// Payload serialization method (high nibble of byte 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationMethod {
    None,
    Json,
    /// Includes the provider's "custom" code 15, which has no defined behavior
    Unrecognized(u8),
}

impl SerializationMethod {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0 => SerializationMethod::None,
            1 => SerializationMethod::Json,
            other => SerializationMethod::Unrecognized(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            SerializationMethod::None => 0,
            SerializationMethod::Json => 1,
            SerializationMethod::Unrecognized(value) => value,
        }
    }
}

impl fmt::Display for SerializationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationMethod::None => write!(f, "no serialization"),
            SerializationMethod::Json => write!(f, "JSON"),
            SerializationMethod::Unrecognized(value) => {
                write!(f, "unrecognized serialization {value:#x}")
            }
        }
    }
}

/// Payload compression method (low nibble of byte 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMethod {
    None,
    #[default]
    Gzip,
    /// Includes the provider's "custom" code 15, which has no defined behavior
    Unrecognized(u8),
}

impl CompressionMethod {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0 => CompressionMethod::None,
            1 => CompressionMethod::Gzip,
            other => CompressionMethod::Unrecognized(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Gzip => 1,
            CompressionMethod::Unrecognized(value) => value,
        }
    }

    /// Parse a configuration string ("gzip" or "none").
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gzip" => Some(CompressionMethod::Gzip),
            "none" | "identity" => Some(CompressionMethod::None),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::None => write!(f, "no compression"),
            CompressionMethod::Gzip => write!(f, "gzip"),
            CompressionMethod::Unrecognized(value) => {
                write!(f, "unrecognized compression {value:#x}")
            }
        }
    }
}

// =============================================================================
// FrameHeader
// =============================================================================

/// Decoded fixed header of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    /// Header length in 4-byte words, including the fixed 4 bytes
    pub header_size: u8,
    pub message_type: MessageType,
    pub flags: MessageFlags,
    pub serialization: SerializationMethod,
    pub compression: CompressionMethod,
    /// Opaque, preserved as received
    pub reserved: u8,
}

impl FrameHeader {
    /// Header used by the client for every full request.
    pub fn client_request(compression: CompressionMethod) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            header_size: 1,
            message_type: MessageType::FullClientRequest,
            flags: MessageFlags::NoSequence,
            serialization: SerializationMethod::Json,
            compression,
            reserved: 0,
        }
    }

    /// Total header length in bytes (fixed part plus extensions).
    pub fn header_len(&self) -> usize {
        self.header_size as usize * HEADER_WORD_LEN
    }

    /// Length of the header-extension region in bytes.
    pub fn extension_len(&self) -> usize {
        self.header_len().saturating_sub(FIXED_HEADER_LEN)
    }

    /// Pack the header into its 4-byte wire form.
    pub fn encode(&self) -> ProtocolResult<[u8; FIXED_HEADER_LEN]> {
        let version = nibble("version", self.version)?;
        let header_size = nibble("header_size", self.header_size)?;
        let message_type = nibble("message_type", self.message_type.to_nibble())?;
        let flags = nibble("flags", self.flags.to_nibble())?;
        let serialization = nibble("serialization", self.serialization.to_nibble())?;
        let compression = nibble("compression", self.compression.to_nibble())?;

        Ok([
            (version << 4) | header_size,
            (message_type << 4) | flags,
            (serialization << 4) | compression,
            self.reserved,
        ])
    }

    /// Decode a frame into its header, the opaque extension bytes and the
    /// remaining payload region.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<(FrameHeader, &[u8], &[u8])> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(ProtocolError::TruncatedFrame {
                needed: FIXED_HEADER_LEN,
                available: bytes.len(),
            });
        }

        let header = FrameHeader {
            version: bytes[0] >> 4,
            header_size: bytes[0] & NIBBLE_MAX,
            message_type: MessageType::from_nibble(bytes[1] >> 4),
            flags: MessageFlags::from_nibble(bytes[1] & NIBBLE_MAX),
            serialization: SerializationMethod::from_nibble(bytes[2] >> 4),
            compression: CompressionMethod::from_nibble(bytes[2] & NIBBLE_MAX),
            reserved: bytes[3],
        };

        if header.header_size == 0 {
            return Err(ProtocolError::InvalidHeaderSize(0));
        }

        let header_len = header.header_len();
        if bytes.len() < header_len {
            return Err(ProtocolError::TruncatedFrame {
                needed: header_len,
                available: bytes.len(),
            });
        }

        Ok((
            header,
            &bytes[FIXED_HEADER_LEN..header_len],
            &bytes[header_len..],
        ))
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} header={}B type=[{}] flags=[{}] serialization=[{}] compression=[{}] reserved={:#04x}",
            self.version,
            self.header_len(),
            self.message_type,
            self.flags,
            self.serialization,
            self.compression,
            self.reserved
        )
    }
}

fn nibble(field: &'static str, value: u8) -> ProtocolResult<u8> {
    if value > NIBBLE_MAX {
        return Err(ProtocolError::Encoding { field, value });
    }
    Ok(value)
}

// =============================================================================
// FrameReader
// =============================================================================

/// Bounds-checked big-endian cursor over a payload region.
///
/// Every read past the end fails with `TruncatedFrame` instead of
/// returning a short slice.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::TruncatedFrame {
                needed: self.pos.saturating_add(len),
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a `u32` length prefix followed by exactly that many bytes.
    pub fn read_sized(&mut self) -> ProtocolResult<(u32, &'a [u8])> {
        let size = self.read_u32()?;
        let data = self.read_bytes(size as usize)?;
        Ok((size, data))
    }

    /// Everything not consumed yet.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
