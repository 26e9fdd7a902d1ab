//! Request envelope and the payload serialization/compression pipeline.
//!
//! The envelope is the JSON document the service expects inside a full
//! client request:
//!
//! ```json
//! {
//!   "app": { "appid": "...", "token": "...", "cluster": "volcano_tts" },
//!   "user": { "uid": "..." },
//!   "audio": {
//!     "voice_type": "...", "encoding": "mp3",
//!     "speed_ratio": 1.0, "volume_ratio": 1.0, "pitch_ratio": 1.0
//!   },
//!   "request": {
//!     "reqid": "...", "text": "...", "text_type": "plain", "operation": "submit"
//!   }
//! }
//! ```

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use super::error::{ProtocolError, ProtocolResult};
use super::header::CompressionMethod;

// =============================================================================
// Request Envelope
// =============================================================================

/// Application identity section.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSection {
    pub appid: String,
    pub token: String,
    pub cluster: String,
}

impl fmt::Debug for AppSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSection")
            .field("appid", &self.appid)
            .field("token", &"[REDACTED]")
            .field("cluster", &self.cluster)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSection {
    pub uid: String,
}

/// Voice and audio output parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSection {
    pub voice_type: String,
    pub encoding: String,
    pub speed_ratio: f64,
    pub volume_ratio: f64,
    pub pitch_ratio: f64,
}

/// Which exchange the request opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Streamed synthesis: many audio frames, last one has a negative sequence
    Submit,
    /// One-shot synthesis: exactly one response frame
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Submit => "submit",
            Operation::Query => "query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSection {
    pub reqid: String,
    pub text: String,
    pub text_type: String,
    pub operation: Operation,
}

/// Full request envelope sent to the synthesis service.
///
/// Values are immutable per call: [`RequestEnvelope::for_request`] derives
/// a fresh envelope from a template instead of mutating shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub app: AppSection,
    pub user: UserSection,
    pub audio: AudioSection,
    pub request: RequestSection,
}

impl RequestEnvelope {
    /// Derive the envelope for one request from this template.
    pub fn for_request(
        &self,
        operation: Operation,
        reqid: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            app: self.app.clone(),
            user: self.user.clone(),
            audio: self.audio.clone(),
            request: RequestSection {
                reqid: reqid.into(),
                text: text.into(),
                text_type: self.request.text_type.clone(),
                operation,
            },
        }
    }

    /// Same envelope with a different operation and request id.
    pub fn with_operation(&self, operation: Operation, reqid: impl Into<String>) -> Self {
        let text = self.request.text.clone();
        self.for_request(operation, reqid, text)
    }
}

// =============================================================================
// Serialization
// =============================================================================

/// Serialize the envelope to its JSON wire form.
pub fn serialize_request(envelope: &RequestEnvelope) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Parse a JSON envelope, as the service would on receipt.
pub fn deserialize_request(bytes: &[u8]) -> ProtocolResult<RequestEnvelope> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

// =============================================================================
// Compression
// =============================================================================

/// Apply the compression transform named by `method`.
pub fn compress(bytes: &[u8], method: CompressionMethod) -> ProtocolResult<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(bytes.to_vec()),
        CompressionMethod::Gzip => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len()), Compression::default());
            encoder
                .write_all(bytes)
                .map_err(|e| ProtocolError::Serialization(format!("gzip compression failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| ProtocolError::Serialization(format!("gzip compression failed: {e}")))
        }
        CompressionMethod::Unrecognized(code) => Err(ProtocolError::UnsupportedCompression(code)),
    }
}

/// Remove the compression transform named by `method`.
pub fn decompress(bytes: &[u8], method: CompressionMethod) -> ProtocolResult<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(bytes.to_vec()),
        CompressionMethod::Gzip => {
            // Every member is decoded; anything after the last member must be
            // another valid member
            let mut decoder = MultiGzDecoder::new(bytes);
            let mut out = Vec::with_capacity(bytes.len() * 2);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ProtocolError::Decode(format!("malformed gzip data: {e}")))?;
            Ok(out)
        }
        CompressionMethod::Unrecognized(code) => Err(ProtocolError::UnsupportedCompression(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_support::fixture_envelope;

    #[test]
    fn test_serialize_request_exact_json() {
        let bytes = serialize_request(&fixture_envelope()).unwrap();
        let expected = concat!(
            r#"{"app":{"appid":"test-app","token":"test-token","cluster":"volcano_tts"},"#,
            r#""user":{"uid":"388808087185088"},"#,
            r#""audio":{"voice_type":"zh_female_test","encoding":"mp3","speed_ratio":1.0,"volume_ratio":1.0,"pitch_ratio":1.0},"#,
            r#""request":{"reqid":"fixed-req-id","text":"hello","text_type":"plain","operation":"submit"}}"#
        );
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn test_request_pipeline_recovers_envelope() {
        let envelope = fixture_envelope();
        let serialized = serialize_request(&envelope).unwrap();
        let compressed = compress(&serialized, CompressionMethod::Gzip).unwrap();
        assert_ne!(compressed, serialized);

        let decompressed = decompress(&compressed, CompressionMethod::Gzip).unwrap();
        assert_eq!(deserialize_request(&decompressed).unwrap(), envelope);
    }

    #[test]
    fn test_identity_compression() {
        let data = b"plain bytes".to_vec();
        assert_eq!(compress(&data, CompressionMethod::None).unwrap(), data);
        assert_eq!(decompress(&data, CompressionMethod::None).unwrap(), data);
    }

    #[test]
    fn test_custom_compression_is_unsupported() {
        assert_eq!(
            compress(b"x", CompressionMethod::Unrecognized(15)),
            Err(ProtocolError::UnsupportedCompression(15))
        );
        assert_eq!(
            decompress(b"x", CompressionMethod::Unrecognized(15)),
            Err(ProtocolError::UnsupportedCompression(15))
        );
    }

    #[test]
    fn test_malformed_gzip_is_decode_error() {
        let result = decompress(b"definitely not gzip", CompressionMethod::Gzip);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_gzip_members_are_concatenated() {
        let mut data = compress(b"text too ", CompressionMethod::Gzip).unwrap();
        data.extend(compress(b"long", CompressionMethod::Gzip).unwrap());

        let decoded = decompress(&data, CompressionMethod::Gzip).unwrap();
        assert_eq!(decoded, b"text too long");
    }

    #[test]
    fn test_gzip_trailing_garbage_is_decode_error() {
        let mut data = compress(b"text too long", CompressionMethod::Gzip).unwrap();
        data.extend_from_slice(b"GARBAGE");

        let result = decompress(&data, CompressionMethod::Gzip);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_empty_and_truncated_gzip_are_decode_errors() {
        let data = compress(b"text too long", CompressionMethod::Gzip).unwrap();
        assert!(matches!(
            decompress(&data[..data.len() - 4], CompressionMethod::Gzip),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            decompress(&[], CompressionMethod::Gzip),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_for_request_leaves_template_untouched() {
        let template = fixture_envelope();
        let query = template.for_request(Operation::Query, "another-id", "bye");

        assert_eq!(query.request.operation, Operation::Query);
        assert_eq!(query.request.reqid, "another-id");
        assert_eq!(query.request.text, "bye");
        assert_eq!(query.app, template.app);
        assert_eq!(template.request.operation, Operation::Submit);
        assert_eq!(template.request.reqid, "fixed-req-id");
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", fixture_envelope());
        assert!(!debug.contains("test-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
