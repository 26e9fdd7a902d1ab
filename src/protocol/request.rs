//! Outgoing full-client-request frames.
//!
//! Layout: fixed 4-byte header, `u32` big-endian payload length, then the
//! serialized (and usually gzip-compressed) envelope. The client never
//! emits header extensions.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use uuid::Uuid;

use super::error::{ProtocolError, ProtocolResult};
use super::header::{CompressionMethod, FIXED_HEADER_LEN, FrameHeader};
use super::payload::{Operation, RequestEnvelope, compress, serialize_request};

/// Length of the payload size prefix.
const LENGTH_PREFIX_LEN: usize = 4;

/// A request frame ready for the transport, with the envelope it carries.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub envelope: RequestEnvelope,
    pub frame: Bytes,
}

impl OutgoingRequest {
    pub fn request_id(&self) -> &str {
        &self.envelope.request.reqid
    }

    pub fn operation(&self) -> Operation {
        self.envelope.request.operation
    }
}

/// Builds full client request frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder {
    compression: CompressionMethod,
}

impl RequestBuilder {
    pub fn new(compression: CompressionMethod) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// Streaming synthesis request with a fresh request id.
    pub fn build_submit(&self, envelope: &RequestEnvelope) -> ProtocolResult<OutgoingRequest> {
        self.build(envelope.with_operation(Operation::Submit, new_request_id()))
    }

    /// One-shot synthesis request with a fresh request id.
    pub fn build_query(&self, envelope: &RequestEnvelope) -> ProtocolResult<OutgoingRequest> {
        self.build(envelope.with_operation(Operation::Query, new_request_id()))
    }

    /// Encode `envelope` as-is, request id and operation included.
    pub fn build(&self, envelope: RequestEnvelope) -> ProtocolResult<OutgoingRequest> {
        let header = FrameHeader::client_request(self.compression).encode()?;
        let payload = compress(&serialize_request(&envelope)?, self.compression)?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

        let mut frame = BytesMut::with_capacity(FIXED_HEADER_LEN + LENGTH_PREFIX_LEN + payload.len());
        frame.put_slice(&header);
        frame.put_u32(payload_len);
        frame.put_slice(&payload);

        debug!(
            "Built {} request {} ({} payload bytes, {})",
            envelope.request.operation, envelope.request.reqid, payload_len, self.compression
        );

        Ok(OutgoingRequest {
            envelope,
            frame: frame.freeze(),
        })
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
