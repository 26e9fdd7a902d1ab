//! Interpretation of one received frame.
//!
//! [`parse_frame`] decodes the header, then applies the payload layout of
//! the message type:
//!
//! | Type | Payload layout |
//! |------|----------------|
//! | Audio-only (0xb), flags = 0 | none (acknowledgement) |
//! | Audio-only (0xb), flags != 0 | `i32` sequence, `u32` size, audio bytes |
//! | Frontend (0xc) | `u32` size, data (maybe compressed) |
//! | Error (0xf) | `u32` code, `u32` size, message (maybe compressed) |

use bytes::Bytes;
use tracing::{debug, warn};

use super::error::{ProtocolError, ProtocolResult};
use super::header::{
    CompressionMethod, FrameHeader, FrameReader, MessageFlags, MessageType, SerializationMethod,
};
use super::payload::decompress;

/// One chunk of synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sequence: i32,
    /// Size declared in the frame; always equals `data.len()`
    pub declared_size: u32,
    pub data: Bytes,
}

impl AudioChunk {
    /// A negative sequence number marks the end of the stream.
    pub fn is_last(&self) -> bool {
        self.sequence < 0
    }
}

/// Well-formed error report from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: u32,
    pub declared_size: u32,
    pub message: String,
}

/// Diagnostic data from the service frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendMessage {
    pub serialization: SerializationMethod,
    /// Decompressed payload
    pub payload: Bytes,
}

impl FrontendMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> ProtocolResult<serde_json::Value> {
        match self.serialization {
            SerializationMethod::Json => serde_json::from_slice(&self.payload)
                .map_err(|e| ProtocolError::Decode(format!("invalid frontend JSON: {e}"))),
            other => Err(ProtocolError::UnsupportedSerialization(other.to_nibble())),
        }
    }

    /// Payload as lossy UTF-8 text, for logging.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Typed content of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Audio response without sequence number and payload
    Ack,
    Audio(AudioChunk),
    Frontend(FrontendMessage),
    Error(ErrorPayload),
}

/// A decoded frame: header, opaque extensions and typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub header: FrameHeader,
    pub extensions: Bytes,
    pub body: FrameBody,
}

impl ParsedFrame {
    /// Whether this frame alone ends the response stream.
    pub fn is_terminal(&self) -> bool {
        match &self.body {
            FrameBody::Ack | FrameBody::Frontend(_) => false,
            FrameBody::Audio(chunk) => chunk.is_last(),
            FrameBody::Error(_) => true,
        }
    }
}

/// Parse one whole frame as delivered by the transport.
pub fn parse_frame(raw: &[u8]) -> ProtocolResult<ParsedFrame> {
    let (header, extensions, payload) = FrameHeader::decode(raw)?;
    debug!("Frame header: {}", header);
    if !extensions.is_empty() {
        debug!("Header extensions: {} bytes", extensions.len());
    }

    let body = match header.message_type {
        MessageType::AudioOnlyResponse => parse_audio(header.flags, payload)?,
        MessageType::ErrorResponse => FrameBody::Error(parse_error(header.compression, payload)?),
        MessageType::FrontendResponse => FrameBody::Frontend(parse_frontend(&header, payload)?),
        other => return Err(ProtocolError::UnknownMessageType(other.to_nibble())),
    };

    Ok(ParsedFrame {
        header,
        extensions: Bytes::copy_from_slice(extensions),
        body,
    })
}

fn parse_audio(flags: MessageFlags, payload: &[u8]) -> ProtocolResult<FrameBody> {
    if !flags.has_sequence() {
        return Ok(FrameBody::Ack);
    }

    let mut reader = FrameReader::new(payload);
    let sequence = reader.read_i32()?;
    let (declared_size, data) = reader.read_sized()?;
    warn_trailing(&reader, "audio");

    Ok(FrameBody::Audio(AudioChunk {
        sequence,
        declared_size,
        data: Bytes::copy_from_slice(data),
    }))
}

fn parse_error(compression: CompressionMethod, payload: &[u8]) -> ProtocolResult<ErrorPayload> {
    let mut reader = FrameReader::new(payload);
    let code = reader.read_u32()?;
    let (declared_size, data) = reader.read_sized()?;
    warn_trailing(&reader, "error");

    let message = String::from_utf8(decompress(data, compression)?)
        .map_err(|e| ProtocolError::Decode(format!("error message is not UTF-8: {e}")))?;

    Ok(ErrorPayload {
        code,
        declared_size,
        message,
    })
}

fn parse_frontend(header: &FrameHeader, payload: &[u8]) -> ProtocolResult<FrontendMessage> {
    let mut reader = FrameReader::new(payload);
    let (_, data) = reader.read_sized()?;
    warn_trailing(&reader, "frontend");

    Ok(FrontendMessage {
        serialization: header.serialization,
        payload: Bytes::from(decompress(data, header.compression)?),
    })
}

fn warn_trailing(reader: &FrameReader<'_>, kind: &str) {
    if reader.remaining() > 0 {
        warn!(
            "Ignoring {} trailing bytes after declared {} payload",
            reader.remaining(),
            kind
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payload::compress;
    use crate::protocol::test_support::{
        ack_frame, audio_frame, error_frame, frontend_frame, raw_frame,
    };

    #[test]
    fn test_parse_ack_frame() {
        let frame = parse_frame(&ack_frame()).unwrap();
        assert_eq!(frame.body, FrameBody::Ack);
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_parse_audio_chunk() {
        let frame = parse_frame(&audio_frame(1, b"abc")).unwrap();
        match &frame.body {
            FrameBody::Audio(chunk) => {
                assert_eq!(chunk.sequence, 1);
                assert_eq!(chunk.declared_size, 3);
                assert_eq!(&chunk.data[..], b"abc");
            }
            other => panic!("Expected audio chunk, got: {other:?}"),
        }
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_negative_sequence_is_terminal() {
        let frame = parse_frame(&audio_frame(-3, b"end")).unwrap();
        assert!(frame.is_terminal());
    }

    #[test]
    fn test_audio_declared_size_past_end_is_truncated() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1i32.to_be_bytes());
        payload.extend_from_slice(&10u32.to_be_bytes());
        payload.extend_from_slice(b"short");
        let raw = raw_frame(0xb, 0x1, 0x0, &[], &payload);

        assert!(matches!(
            parse_frame(&raw),
            Err(ProtocolError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn test_audio_missing_sequence_is_truncated() {
        let raw = raw_frame(0xb, 0x1, 0x0, &[], &[0, 0]);
        assert!(matches!(
            parse_frame(&raw),
            Err(ProtocolError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn test_parse_gzip_error_frame() {
        let frame = parse_frame(&error_frame(45000003, "text too long", true)).unwrap();
        match &frame.body {
            FrameBody::Error(err) => {
                assert_eq!(err.code, 45000003);
                assert_eq!(err.message, "text too long");
            }
            other => panic!("Expected error payload, got: {other:?}"),
        }
        assert!(frame.is_terminal());
    }

    #[test]
    fn test_parse_plain_error_frame() {
        let frame = parse_frame(&error_frame(3001, "invalid params", false)).unwrap();
        assert_eq!(
            frame.body,
            FrameBody::Error(ErrorPayload {
                code: 3001,
                declared_size: 14,
                message: "invalid params".to_string(),
            })
        );
    }

    #[test]
    fn test_corrupt_gzip_error_is_decode_error() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&4u32.to_be_bytes());
        payload.extend_from_slice(b"oops");
        let raw = raw_frame(0xf, 0x0, 0x1, &[], &payload);

        assert!(matches!(parse_frame(&raw), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_error_message_with_trailing_garbage_is_decode_error() {
        let mut data = compress(b"text too long", CompressionMethod::Gzip).unwrap();
        data.extend_from_slice(b"GARBAGE");
        let mut payload = 7u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
        payload.extend_from_slice(&data);
        let raw = raw_frame(0xf, 0x0, 0x1, &[], &payload);

        assert!(matches!(parse_frame(&raw), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_parse_frontend_frame() {
        let frame = parse_frame(&frontend_frame(r#"{"phonemes":[]}"#, true)).unwrap();
        match &frame.body {
            FrameBody::Frontend(message) => {
                assert_eq!(message.text(), r#"{"phonemes":[]}"#);
                assert!(message.json().unwrap()["phonemes"].is_array());
            }
            other => panic!("Expected frontend message, got: {other:?}"),
        }
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_frontend_json_requires_json_serialization() {
        let mut payload = 3u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"raw");
        // serialization nibble 0xf, compression 0
        let mut raw = raw_frame(0xc, 0x0, 0x0, &[], &payload);
        raw[2] = 0xf0;

        let frame = parse_frame(&raw).unwrap();
        match frame.body {
            FrameBody::Frontend(message) => assert_eq!(
                message.json(),
                Err(ProtocolError::UnsupportedSerialization(0xf))
            ),
            other => panic!("Expected frontend message, got: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_message_type() {
        for message_type in [0x0u8, 0x1, 0x2, 0x9, 0xa, 0xd, 0xe] {
            let raw = raw_frame(message_type, 0x0, 0x0, &[], &[]);
            assert_eq!(
                parse_frame(&raw),
                Err(ProtocolError::UnknownMessageType(message_type))
            );
        }
    }

    #[test]
    fn test_extensions_are_passed_through() {
        let mut payload = 2i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(b"hi");
        let raw = raw_frame(0xb, 0x1, 0x0, &[0xde, 0xad, 0xbe, 0xef], &payload);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.header.header_size, 2);
        assert_eq!(&frame.extensions[..], &[0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(frame.body, FrameBody::Audio(ref c) if &c.data[..] == b"hi"));
    }

    #[test]
    fn test_trailing_bytes_after_declared_size_are_ignored() {
        let mut raw = audio_frame(4, b"data");
        raw.extend_from_slice(b"junk");

        let frame = parse_frame(&raw).unwrap();
        assert!(matches!(frame.body, FrameBody::Audio(ref c) if &c.data[..] == b"data"));
    }
}
