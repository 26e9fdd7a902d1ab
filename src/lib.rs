pub mod client;
pub mod config;
pub mod errors;
pub mod protocol;

// Re-export commonly used items for convenience
pub use client::{AudioSink, DoubaoTTS, FileAudioSink, SynthesisOutput};
pub use config::{AudioEncoding, TtsClientConfig};
pub use errors::{TTSError, TTSResult};
pub use protocol::{Operation, ProtocolError, RequestBuilder, ResponseAggregator};
