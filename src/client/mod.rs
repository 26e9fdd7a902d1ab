//! High-level synthesis client.
//!
//! [`DoubaoTTS`] opens one websocket connection per exchange, sends a single
//! full client request and drives the receive loop until the session is
//! terminal. The connection is closed afterwards whatever the outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use doubao_tts::client::{DoubaoTTS, FileAudioSink};
//! use doubao_tts::config::TtsClientConfig;
//!
//! let client = DoubaoTTS::new(TtsClientConfig::from_env()?)?;
//! let mut sink = FileAudioSink::new("output.mp3");
//! let output = client.submit("你好，世界", &mut sink).await?;
//! println!("{} bytes in {} chunks", output.audio.len(), output.chunks);
//! ```

mod session;
mod sink;
mod transport;

pub use session::{SynthesisOutput, run_session};
pub use sink::{AudioSink, FileAudioSink};
pub use transport::{FrameTransport, WebSocketTransport};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TtsClientConfig;
use crate::errors::{TTSError, TTSResult};
use crate::protocol::{FrontendListener, Operation, RequestBuilder, RequestEnvelope};

/// Client for the binary websocket synthesis service.
pub struct DoubaoTTS {
    config: TtsClientConfig,
    builder: RequestBuilder,
    template: RequestEnvelope,
    frontend_listener: Option<FrontendListener>,
    shutdown: CancellationToken,
}

impl DoubaoTTS {
    /// Validate `config` and prepare the request template.
    pub fn new(config: TtsClientConfig) -> TTSResult<Self> {
        config.validate()?;
        let builder = RequestBuilder::new(config.compression);
        let template = config.request_template();
        Ok(Self {
            config,
            builder,
            template,
            frontend_listener: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Receive frontend messages of every exchange made by this client.
    pub fn with_frontend_listener(mut self, listener: FrontendListener) -> Self {
        self.frontend_listener = Some(listener);
        self
    }

    /// Cancelling `token` closes the connection of any exchange in flight;
    /// the exchange then fails with [`TTSError::TransportClosed`].
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &TtsClientConfig {
        &self.config
    }

    /// Streaming synthesis: audio arrives over several frames until the
    /// last negative sequence number.
    pub async fn submit<S>(&self, text: &str, sink: &mut S) -> TTSResult<SynthesisOutput>
    where
        S: AudioSink + ?Sized,
    {
        self.exchange(Operation::Submit, text, sink).await
    }

    /// Non-streaming synthesis: the first response frame ends the exchange.
    pub async fn query<S>(&self, text: &str, sink: &mut S) -> TTSResult<SynthesisOutput>
    where
        S: AudioSink + ?Sized,
    {
        self.exchange(Operation::Query, text, sink).await
    }

    async fn exchange<S>(
        &self,
        operation: Operation,
        text: &str,
        sink: &mut S,
    ) -> TTSResult<SynthesisOutput>
    where
        S: AudioSink + ?Sized,
    {
        let mut transport = WebSocketTransport::connect(&self.config)
            .await?
            .with_shutdown(self.shutdown.child_token());
        let result = self
            .exchange_over(&mut transport, operation, text, sink)
            .await;

        if let Err(e) = transport.close().await {
            warn!("Failed to close websocket cleanly: {}", e);
        }
        result
    }

    /// Run one exchange over an already open transport. The transport is
    /// left open.
    pub async fn exchange_over<T, S>(
        &self,
        transport: &mut T,
        operation: Operation,
        text: &str,
        sink: &mut S,
    ) -> TTSResult<SynthesisOutput>
    where
        T: FrameTransport + ?Sized,
        S: AudioSink + ?Sized,
    {
        if text.trim().is_empty() {
            return Err(TTSError::InvalidRequest("text must not be empty".to_string()));
        }

        let mut envelope = self.template.clone();
        envelope.request.text = text.to_string();
        let request = match operation {
            Operation::Submit => self.builder.build_submit(&envelope)?,
            Operation::Query => self.builder.build_query(&envelope)?,
        };
        debug!(
            "Built {} request {} for {} characters",
            operation,
            request.request_id(),
            text.chars().count()
        );

        run_session(transport, &request, sink, self.frontend_listener.clone()).await
    }
}
