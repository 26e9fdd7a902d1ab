//! Client-level error type.

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors surfaced by a synthesis exchange.
#[derive(Debug, Error)]
pub enum TTSError {
    /// Configuration is missing or out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller's request cannot be sent as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Websocket handshake or TCP/TLS connect failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Handshake rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Websocket error after the connection was established
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Transport closed while a frame was still expected
    #[error("Transport closed")]
    TransportClosed,

    /// A received frame could not be decoded, or the request could not be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Well-formed error frame from the service
    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    /// The audio sink rejected a write
    #[error("Audio sink error: {0}")]
    AudioSink(String),
}

/// Result type for client operations.
pub type TTSResult<T> = Result<T, TTSError>;

impl TTSError {
    /// Errors coming from the remote service or the connection, as opposed
    /// to local misuse.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TTSError::ConnectionFailed(_)
                | TTSError::AuthenticationFailed(_)
                | TTSError::WebSocketError(_)
                | TTSError::TransportClosed
                | TTSError::Server { .. }
        )
    }
}
