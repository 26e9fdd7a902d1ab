//! Frame transport boundary and its websocket implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{self, Error as WsError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TtsClientConfig;
use crate::errors::{TTSError, TTSResult};

/// Message-oriented connection delivering whole frames.
///
/// Once the connection is closed by either side, `recv_frame` must fail
/// with [`TTSError::TransportClosed`] instead of waiting.
#[async_trait]
pub trait FrameTransport: Send {
    async fn send_frame(&mut self, frame: Bytes) -> TTSResult<()>;

    async fn recv_frame(&mut self) -> TTSResult<Bytes>;

    async fn close(&mut self) -> TTSResult<()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket connection to the synthesis service.
///
/// `recv_frame` holds `&mut self` for as long as it waits, so other tasks
/// close the transport through [`WebSocketTransport::shutdown_handle`].
/// Cancelling that token fails a pending or later `recv_frame` with
/// [`TTSError::TransportClosed`].
pub struct WebSocketTransport {
    stream: WsStream,
    shutdown: CancellationToken,
    /// The websocket itself has been closed
    closed: bool,
}

impl WebSocketTransport {
    /// Open the websocket with the bearer authorization header.
    pub async fn connect(config: &TtsClientConfig) -> TTSResult<Self> {
        let url = config.endpoint_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TTSError::ConnectionFailed(format!("Invalid websocket request: {e}")))?;
        let auth = HeaderValue::from_str(&config.authorization_header()).map_err(|_| {
            TTSError::InvalidConfiguration("access_token contains invalid header characters".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        debug!("Connecting to {}", url);
        let (stream, response) = match timeout(config.connect_timeout(), connect_async(request)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(WsError::Http(response))) => {
                let status = response.status();
                let body = response
                    .body()
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                return Err(if status == 401 || status == 403 {
                    TTSError::AuthenticationFailed(format!("HTTP {status}: {body}"))
                } else {
                    TTSError::ConnectionFailed(format!("HTTP {status}: {body}"))
                });
            }
            Ok(Err(e)) => {
                return Err(TTSError::ConnectionFailed(format!(
                    "Failed to connect to {url}: {e}"
                )));
            }
            Err(_) => {
                return Err(TTSError::ConnectionFailed(format!(
                    "Timed out after {:?} connecting to {url}",
                    config.connect_timeout()
                )));
            }
        };

        info!("Connected to {} (HTTP {})", url, response.status());
        Ok(Self {
            stream,
            shutdown: CancellationToken::new(),
            closed: false,
        })
    }

    /// Use `token` (typically a child of a caller-owned token) as this
    /// transport's shutdown signal.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that closes this transport from another task.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed || self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn send_frame(&mut self, frame: Bytes) -> TTSResult<()> {
        if self.is_closed() {
            return Err(TTSError::TransportClosed);
        }
        self.stream
            .send(Message::Binary(frame))
            .await
            .map_err(map_ws_error)
    }

    async fn recv_frame(&mut self) -> TTSResult<Bytes> {
        if self.is_closed() {
            return Err(TTSError::TransportClosed);
        }

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Transport shut down while waiting for a frame");
                    return Err(TTSError::TransportClosed);
                }
                message = self.stream.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Text(text))) => {
                    warn!("Ignoring unexpected text message: {}", text.as_str());
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    debug!("Received websocket ping/pong");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Websocket closed by server: {:?}", frame);
                    self.closed = true;
                    return Err(TTSError::TransportClosed);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    let err = map_ws_error(e);
                    if matches!(err, TTSError::TransportClosed) {
                        self.closed = true;
                    }
                    return Err(err);
                }
                None => {
                    self.closed = true;
                    return Err(TTSError::TransportClosed);
                }
            }
        }
    }

    async fn close(&mut self) -> TTSResult<()> {
        self.shutdown.cancel();
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> TTSError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TTSError::TransportClosed,
        other => TTSError::WebSocketError(other.to_string()),
    }
}
