//! Drives one request/response exchange over a transport.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::sink::AudioSink;
use super::transport::FrameTransport;
use crate::errors::{TTSError, TTSResult};
use crate::protocol::{
    FrontendListener, Operation, OutgoingRequest, ResponseAggregator, SessionOutcome,
};

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub request_id: String,
    pub operation: Operation,
    /// All audio bytes, in arrival order
    pub audio: Bytes,
    pub chunks: usize,
}

/// Send `request` and consume response frames until the session is
/// terminal.
///
/// Appended audio is streamed to `sink` as each frame arrives. The sink is
/// finished on success and aborted on any failure. Transport errors are
/// returned unchanged; the caller owns any timeout around this call.
pub async fn run_session<T, S>(
    transport: &mut T,
    request: &OutgoingRequest,
    sink: &mut S,
    frontend_listener: Option<FrontendListener>,
) -> TTSResult<SynthesisOutput>
where
    T: FrameTransport + ?Sized,
    S: AudioSink + ?Sized,
{
    let result = drive_session(transport, request, sink, frontend_listener).await;
    if result.is_err() {
        if let Err(e) = sink.abort().await {
            warn!("Failed to discard audio of request {}: {}", request.request_id(), e);
        }
    }
    result
}

async fn drive_session<T, S>(
    transport: &mut T,
    request: &OutgoingRequest,
    sink: &mut S,
    frontend_listener: Option<FrontendListener>,
) -> TTSResult<SynthesisOutput>
where
    T: FrameTransport + ?Sized,
    S: AudioSink + ?Sized,
{
    let operation = request.operation();
    let mut aggregator = ResponseAggregator::new(operation);
    if let Some(listener) = frontend_listener {
        aggregator = aggregator.with_frontend_listener(listener);
    }

    debug!(
        "Sending {} request {} ({} bytes)",
        operation,
        request.request_id(),
        request.frame.len()
    );
    transport.send_frame(request.frame.clone()).await?;

    while !aggregator.is_terminal() {
        let raw = transport.recv_frame().await?;
        if let Some(audio) = aggregator.on_frame(&raw) {
            sink.append(&audio).await?;
        }
    }

    let chunks = aggregator.chunk_count();
    let (audio, outcome) = aggregator.into_parts();
    match outcome {
        Some(SessionOutcome::Success) => {
            sink.finish().await?;
            info!(
                "Request {} complete: {} bytes in {} chunks",
                request.request_id(),
                audio.len(),
                chunks
            );
            Ok(SynthesisOutput {
                request_id: request.request_id().to_string(),
                operation,
                audio,
                chunks,
            })
        }
        Some(SessionOutcome::ServerError { code, message }) => {
            Err(TTSError::Server { code, message })
        }
        Some(SessionOutcome::ProtocolFailure(e)) => Err(TTSError::Protocol(e)),
        None => Err(TTSError::TransportClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_support::{
        ack_frame, audio_frame, error_frame, fixture_envelope, frontend_frame, raw_frame,
    };
    use crate::protocol::{FrontendMessage, ProtocolError, RequestBuilder};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted frames, then reports the transport as closed.
    struct ScriptedTransport {
        incoming: VecDeque<Vec<u8>>,
        sent: Vec<Bytes>,
    }

    impl ScriptedTransport {
        fn new(frames: Vec<Vec<u8>>) -> Self {
            Self {
                incoming: frames.into(),
                sent: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FrameTransport for ScriptedTransport {
        async fn send_frame(&mut self, frame: Bytes) -> TTSResult<()> {
            self.sent.push(frame);
            Ok(())
        }

        async fn recv_frame(&mut self) -> TTSResult<Bytes> {
            self.incoming
                .pop_front()
                .map(Bytes::from)
                .ok_or(TTSError::TransportClosed)
        }

        async fn close(&mut self) -> TTSResult<()> {
            Ok(())
        }
    }

    /// Records how the session ended for its sink.
    #[derive(Default)]
    struct TrackingSink {
        data: Vec<u8>,
        finished: bool,
        aborted: bool,
    }

    #[async_trait]
    impl AudioSink for TrackingSink {
        async fn append(&mut self, chunk: &[u8]) -> TTSResult<()> {
            self.data.extend_from_slice(chunk);
            Ok(())
        }

        async fn finish(&mut self) -> TTSResult<()> {
            self.finished = true;
            Ok(())
        }

        async fn abort(&mut self) -> TTSResult<()> {
            self.aborted = true;
            self.data.clear();
            Ok(())
        }
    }

    fn submit_request() -> OutgoingRequest {
        RequestBuilder::default()
            .build_submit(&fixture_envelope())
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_session_streams_to_sink() {
        let mut transport = ScriptedTransport::new(vec![
            ack_frame(),
            audio_frame(1, b"b1"),
            audio_frame(2, b"b2"),
            audio_frame(-3, b"b3"),
        ]);
        let request = submit_request();
        let mut sink: Vec<u8> = Vec::new();

        let output = run_session(&mut transport, &request, &mut sink, None)
            .await
            .unwrap();

        assert_eq!(&output.audio[..], b"b1b2b3");
        assert_eq!(sink, b"b1b2b3");
        assert_eq!(output.chunks, 3);
        assert_eq!(output.request_id, request.request_id());
        assert_eq!(transport.sent, vec![request.frame.clone()]);
        assert!(transport.incoming.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_ends_session() {
        let mut transport = ScriptedTransport::new(vec![
            audio_frame(1, b"b1"),
            error_frame(45000003, "text too long", true),
            audio_frame(2, b"never read"),
        ]);
        let mut sink: Vec<u8> = Vec::new();

        let result = run_session(&mut transport, &submit_request(), &mut sink, None).await;

        match result {
            Err(TTSError::Server { code, message }) => {
                assert_eq!(code, 45000003);
                assert_eq!(message, "text too long");
            }
            other => panic!("Expected server error, got: {other:?}"),
        }
        assert_eq!(transport.incoming.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_frame_is_protocol_failure() {
        let mut transport = ScriptedTransport::new(vec![raw_frame(0x9, 0x0, 0x0, &[], &[])]);
        let mut sink: Vec<u8> = Vec::new();

        let result = run_session(&mut transport, &submit_request(), &mut sink, None).await;

        assert!(matches!(
            result,
            Err(TTSError::Protocol(ProtocolError::UnknownMessageType(0x9)))
        ));
    }

    #[tokio::test]
    async fn test_closed_transport_fails_instead_of_hanging() {
        let mut transport = ScriptedTransport::new(vec![audio_frame(1, b"b1")]);
        let mut sink: Vec<u8> = Vec::new();

        let result = run_session(&mut transport, &submit_request(), &mut sink, None).await;

        assert!(matches!(result, Err(TTSError::TransportClosed)));
        assert_eq!(sink, b"b1");
    }

    #[tokio::test]
    async fn test_query_reads_exactly_one_frame() {
        let mut transport =
            ScriptedTransport::new(vec![audio_frame(1, b"whole"), audio_frame(-2, b"extra")]);
        let request = RequestBuilder::default()
            .build_query(&fixture_envelope())
            .unwrap();
        let mut sink: Vec<u8> = Vec::new();

        let output = run_session(&mut transport, &request, &mut sink, None)
            .await
            .unwrap();

        assert_eq!(output.operation, Operation::Query);
        assert_eq!(&output.audio[..], b"whole");
        assert_eq!(transport.incoming.len(), 1);
    }

    #[tokio::test]
    async fn test_frontend_listener_receives_messages() {
        let mut transport = ScriptedTransport::new(vec![
            frontend_frame(r#"{"sentence":"hi"}"#, true),
            audio_frame(-1, b"a"),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let listener: FrontendListener = Arc::new(move |message: &FrontendMessage| {
            seen_clone.lock().unwrap().push(message.json().unwrap());
        });
        let mut sink: Vec<u8> = Vec::new();

        run_session(&mut transport, &submit_request(), &mut sink, Some(listener))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["sentence"], "hi");
    }

    #[tokio::test]
    async fn test_sink_finished_only_on_success() {
        let mut transport = ScriptedTransport::new(vec![audio_frame(1, b"a"), audio_frame(-2, b"b")]);
        let mut sink = TrackingSink::default();

        run_session(&mut transport, &submit_request(), &mut sink, None)
            .await
            .unwrap();

        assert!(sink.finished);
        assert!(!sink.aborted);
        assert_eq!(sink.data, b"ab");
    }

    #[tokio::test]
    async fn test_sink_aborted_on_server_error() {
        let mut transport = ScriptedTransport::new(vec![
            audio_frame(1, b"partial"),
            error_frame(3001, "invalid voice type", false),
        ]);
        let mut sink = TrackingSink::default();

        let result = run_session(&mut transport, &submit_request(), &mut sink, None).await;

        assert!(matches!(result, Err(TTSError::Server { code: 3001, .. })));
        assert!(sink.aborted);
        assert!(!sink.finished);
        assert!(sink.data.is_empty());
    }

    #[tokio::test]
    async fn test_sink_aborted_when_transport_closes_early() {
        let mut transport = ScriptedTransport::new(vec![audio_frame(1, b"partial")]);
        let mut sink = TrackingSink::default();

        let result = run_session(&mut transport, &submit_request(), &mut sink, None).await;

        assert!(matches!(result, Err(TTSError::TransportClosed)));
        assert!(sink.aborted);
    }
}
