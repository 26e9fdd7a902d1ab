//! Binary message protocol of the streaming synthesis service.
//!
//! Every websocket message is one frame: a fixed 4-byte header, an optional
//! header-extension region and a payload whose layout depends on the
//! message type.
//!
//! # Architecture
//!
//! - [`header`]: header packing/unpacking and the bounds-checked reader
//! - [`payload`]: request envelope, JSON serialization and compression
//! - [`request`]: full client request frames (`submit` / `query`)
//! - [`frame`]: typed interpretation of received frames
//! - [`aggregator`]: per-session receive state machine
//!
//! # Example
//!
//! ```rust,ignore
//! use doubao_tts::protocol::{Operation, RequestBuilder, ResponseAggregator};
//!
//! let request = RequestBuilder::default().build_submit(&template)?;
//! transport.send(request.frame.clone()).await?;
//!
//! let mut aggregator = ResponseAggregator::new(Operation::Submit);
//! while !aggregator.is_terminal() {
//!     let raw = transport.recv().await?;
//!     aggregator.on_frame(&raw);
//! }
//! ```

pub mod aggregator;
pub mod error;
pub mod frame;
pub mod header;
pub mod payload;
pub mod request;

pub use aggregator::{FrontendListener, ResponseAggregator, SessionOutcome, SessionState};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{AudioChunk, ErrorPayload, FrameBody, FrontendMessage, ParsedFrame, parse_frame};
pub use header::{
    CompressionMethod, FrameHeader, FrameReader, MessageFlags, MessageType, SerializationMethod,
};
pub use payload::{
    AppSection, AudioSection, Operation, RequestEnvelope, RequestSection, UserSection, compress,
    decompress, deserialize_request, serialize_request,
};
pub use request::{OutgoingRequest, RequestBuilder};
