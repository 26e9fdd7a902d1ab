//! Receive-side state machine for one request/response exchange.
//!
//! ```text
//! AwaitingFrame ──audio(seq >= 0) / ack / frontend──▶ AwaitingFrame
//!       │
//!       ├──audio(seq < 0)────────▶ Terminal(Success)
//!       ├──error frame───────────▶ Terminal(ServerError)
//!       └──parse failure─────────▶ Terminal(ProtocolFailure)
//! ```
//!
//! A query exchange finalizes after its first frame whatever that frame
//! says about termination.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, info, warn};

use super::error::ProtocolError;
use super::frame::{FrameBody, FrontendMessage, ParsedFrame, parse_frame};
use super::payload::Operation;

/// Callback receiving frontend messages as they arrive.
pub type FrontendListener = Arc<dyn Fn(&FrontendMessage) + Send + Sync>;

/// How a finished exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    ServerError { code: u32, message: String },
    ProtocolFailure(ProtocolError),
}

/// Aggregator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    Terminal(SessionOutcome),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::AwaitingFrame => write!(f, "AwaitingFrame"),
            SessionState::Terminal(SessionOutcome::Success) => write!(f, "Terminal(Success)"),
            SessionState::Terminal(SessionOutcome::ServerError { code, .. }) => {
                write!(f, "Terminal(ServerError {code})")
            }
            SessionState::Terminal(SessionOutcome::ProtocolFailure(_)) => {
                write!(f, "Terminal(ProtocolFailure)")
            }
        }
    }
}

/// Accumulates audio for one exchange and decides when it is over.
pub struct ResponseAggregator {
    operation: Operation,
    state: SessionState,
    audio: BytesMut,
    frames: usize,
    chunks: usize,
    last_sequence: Option<i32>,
    frontend_listener: Option<FrontendListener>,
}

impl fmt::Debug for ResponseAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseAggregator")
            .field("operation", &self.operation)
            .field("state", &self.state)
            .field("audio_len", &self.audio.len())
            .field("frames", &self.frames)
            .field("chunks", &self.chunks)
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}

impl ResponseAggregator {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: SessionState::AwaitingFrame,
            audio: BytesMut::new(),
            frames: 0,
            chunks: 0,
            last_sequence: None,
            frontend_listener: None,
        }
    }

    pub fn with_frontend_listener(mut self, listener: FrontendListener) -> Self {
        self.frontend_listener = Some(listener);
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Terminal(_))
    }

    /// Audio accumulated so far.
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    /// Number of audio chunks appended.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Feed one raw frame.
    ///
    /// Returns the audio bytes this frame appended, if any, so the caller
    /// can forward them to a sink. Frames arriving after a terminal state
    /// are ignored.
    pub fn on_frame(&mut self, raw: &[u8]) -> Option<Bytes> {
        if self.is_terminal() {
            warn!(
                "Ignoring {}-byte frame received after session reached {}",
                raw.len(),
                self.state
            );
            return None;
        }
        self.frames += 1;

        let appended = match parse_frame(raw) {
            Ok(frame) => self.apply(frame),
            Err(e) => {
                warn!("Failed to parse frame: {}", e);
                self.finish(SessionOutcome::ProtocolFailure(e));
                None
            }
        };

        if self.operation == Operation::Query && !self.is_terminal() {
            self.finish(SessionOutcome::Success);
        }

        appended
    }

    /// Consume the aggregator, yielding the audio buffer and the outcome.
    ///
    /// Returns `None` for the outcome while the session is still open.
    pub fn into_parts(self) -> (Bytes, Option<SessionOutcome>) {
        let outcome = match self.state {
            SessionState::Terminal(outcome) => Some(outcome),
            SessionState::AwaitingFrame => None,
        };
        (self.audio.freeze(), outcome)
    }

    fn apply(&mut self, frame: ParsedFrame) -> Option<Bytes> {
        let terminal = frame.is_terminal();
        match frame.body {
            FrameBody::Ack => {
                debug!("Server acknowledged request");
                None
            }
            FrameBody::Audio(chunk) => {
                self.check_sequence(chunk.sequence);
                debug!(
                    "Audio chunk: sequence={}, size={} bytes",
                    chunk.sequence, chunk.declared_size
                );
                self.audio.extend_from_slice(&chunk.data);
                self.chunks += 1;
                if terminal {
                    self.finish(SessionOutcome::Success);
                }
                Some(chunk.data)
            }
            FrameBody::Frontend(message) => {
                debug!("Frontend message: {}", message.text());
                if let Some(listener) = &self.frontend_listener {
                    listener(&message);
                }
                None
            }
            FrameBody::Error(err) => {
                error!("Server error {}: {}", err.code, err.message);
                self.finish(SessionOutcome::ServerError {
                    code: err.code,
                    message: err.message,
                });
                None
            }
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        self.state = SessionState::Terminal(outcome);
        info!(
            "{} session finished: {} ({} frames, {} chunks, {} audio bytes)",
            self.operation,
            self.state,
            self.frames,
            self.chunks,
            self.audio.len()
        );
    }

    fn check_sequence(&mut self, sequence: i32) {
        if let Some(last) = self.last_sequence {
            if sequence.unsigned_abs() <= last.unsigned_abs() {
                warn!(
                    "Non-monotonic audio sequence: {} after {} (processing in arrival order)",
                    sequence, last
                );
            }
        }
        self.last_sequence = Some(sequence);
    }
}
