//! Client configuration for the synthesis service.
//!
//! Configuration comes from `.env` files, environment variables and YAML.
//! Priority: YAML > ENV vars > .env values > defaults. The `.env` file is
//! loaded by the binary at startup.
//!
//! # Example
//! ```rust,no_run
//! use doubao_tts::config::TtsClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = TtsClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = TtsClientConfig::from_file(&PathBuf::from("tts.yaml"))?;
//! println!("Connecting to {}", config.endpoint);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

use crate::errors::{TTSError, TTSResult};
use crate::protocol::{
    AppSection, AudioSection, CompressionMethod, Operation, RequestEnvelope, RequestSection,
    UserSection,
};

mod env;
mod yaml;

pub use yaml::{AppYaml, AudioYaml, ConnectionYaml, YamlConfig};

/// Binary websocket endpoint of the synthesis service.
pub const DEFAULT_ENDPOINT: &str = "wss://openspeech.bytedance.com/api/v1/tts/ws_binary";

pub const DEFAULT_CLUSTER: &str = "volcano_tts";

pub const DEFAULT_USER_ID: &str = "doubao_tts_user";

pub const DEFAULT_VOICE_TYPE: &str = "zh_female_sajiaonvyou_moon_bigtts";

pub const DEFAULT_TEXT_TYPE: &str = "plain";

pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Accepted speed ratio range.
pub const SPEED_RATIO_RANGE: (f64, f64) = (0.2, 3.0);

/// Accepted volume ratio range.
pub const VOLUME_RATIO_RANGE: (f64, f64) = (0.1, 3.0);

/// Accepted pitch ratio range.
pub const PITCH_RATIO_RANGE: (f64, f64) = (0.1, 3.0);

// =============================================================================
// Audio Encoding
// =============================================================================

/// Output audio container/codec requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioEncoding {
    #[default]
    Mp3,
    Wav,
    Pcm,
    OggOpus,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Wav => "wav",
            AudioEncoding::Pcm => "pcm",
            AudioEncoding::OggOpus => "ogg_opus",
        }
    }

    /// Extension for files holding this encoding.
    pub fn file_extension(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Wav => "wav",
            AudioEncoding::Pcm => "pcm",
            AudioEncoding::OggOpus => "ogg",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mp3" => Some(AudioEncoding::Mp3),
            "wav" => Some(AudioEncoding::Wav),
            "pcm" | "raw" => Some(AudioEncoding::Pcm),
            "ogg_opus" | "ogg-opus" | "opus" => Some(AudioEncoding::OggOpus),
            _ => None,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TtsClientConfig
// =============================================================================

/// Credentials, voice parameters and transport settings for one client.
#[derive(Clone)]
pub struct TtsClientConfig {
    /// Websocket endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    pub app_id: String,
    /// Bearer token; also embedded in every request envelope. Zeroized on drop.
    pub access_token: Zeroizing<String>,
    pub cluster: String,
    pub user_id: String,
    pub voice_type: String,
    pub encoding: AudioEncoding,
    pub speed_ratio: f64,
    pub volume_ratio: f64,
    pub pitch_ratio: f64,
    /// `plain` or `ssml`
    pub text_type: String,
    /// Compression applied to request payloads
    pub compression: CompressionMethod,
    pub connect_timeout_seconds: u64,
}

impl Default for TtsClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            app_id: String::new(),
            access_token: Zeroizing::new(String::new()),
            cluster: DEFAULT_CLUSTER.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            voice_type: DEFAULT_VOICE_TYPE.to_string(),
            encoding: AudioEncoding::default(),
            speed_ratio: 1.0,
            volume_ratio: 1.0,
            pitch_ratio: 1.0,
            text_type: DEFAULT_TEXT_TYPE.to_string(),
            compression: CompressionMethod::Gzip,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl fmt::Debug for TtsClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsClientConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("access_token", &"[REDACTED]")
            .field("cluster", &self.cluster)
            .field("user_id", &self.user_id)
            .field("voice_type", &self.voice_type)
            .field("encoding", &self.encoding)
            .field("speed_ratio", &self.speed_ratio)
            .field("volume_ratio", &self.volume_ratio)
            .field("pitch_ratio", &self.pitch_ratio)
            .field("text_type", &self.text_type)
            .field("compression", &self.compression)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

impl TtsClientConfig {
    /// Load configuration from environment variables over defaults, then
    /// validate it.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variables as
    /// the base layer, then validate it.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), String> {
        if let Some(app) = yaml.app {
            if let Some(value) = app.app_id {
                self.app_id = value;
            }
            if let Some(value) = app.access_token {
                self.access_token = Zeroizing::new(value);
            }
            if let Some(value) = app.cluster {
                self.cluster = value;
            }
            if let Some(value) = app.user_id {
                self.user_id = value;
            }
        }

        if let Some(audio) = yaml.audio {
            if let Some(value) = audio.voice_type {
                self.voice_type = value;
            }
            if let Some(value) = audio.encoding {
                self.encoding = AudioEncoding::parse(&value)
                    .ok_or_else(|| format!("audio.encoding: unsupported audio encoding '{value}'"))?;
            }
            if let Some(value) = audio.speed_ratio {
                self.speed_ratio = value;
            }
            if let Some(value) = audio.volume_ratio {
                self.volume_ratio = value;
            }
            if let Some(value) = audio.pitch_ratio {
                self.pitch_ratio = value;
            }
            if let Some(value) = audio.text_type {
                self.text_type = value;
            }
        }

        if let Some(connection) = yaml.connection {
            if let Some(value) = connection.endpoint {
                self.endpoint = value;
            }
            if let Some(value) = connection.compression {
                self.compression = CompressionMethod::from_str_opt(&value).ok_or_else(|| {
                    format!("connection.compression: unsupported compression '{value}'")
                })?;
            }
            if let Some(value) = connection.connect_timeout_seconds {
                self.connect_timeout_seconds = value;
            }
        }

        Ok(())
    }

    /// Check credentials, endpoint and voice parameter ranges.
    pub fn validate(&self) -> TTSResult<()> {
        require_non_empty("app_id", &self.app_id)?;
        require_non_empty("access_token", &self.access_token)?;
        require_non_empty("cluster", &self.cluster)?;
        require_non_empty("voice_type", &self.voice_type)?;
        self.endpoint_url()?;

        require_range("speed_ratio", self.speed_ratio, SPEED_RATIO_RANGE)?;
        require_range("volume_ratio", self.volume_ratio, VOLUME_RATIO_RANGE)?;
        require_range("pitch_ratio", self.pitch_ratio, PITCH_RATIO_RANGE)?;

        if let CompressionMethod::Unrecognized(code) = self.compression {
            return Err(TTSError::InvalidConfiguration(format!(
                "compression code {code:#x} is not supported"
            )));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(TTSError::InvalidConfiguration(
                "connect_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed websocket endpoint.
    pub fn endpoint_url(&self) -> TTSResult<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            TTSError::InvalidConfiguration(format!("invalid endpoint '{}': {e}", self.endpoint))
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(TTSError::InvalidConfiguration(format!(
                "endpoint scheme must be ws or wss, got '{other}'"
            ))),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Value of the `Authorization` header expected by the service.
    ///
    /// The service uses `Bearer;` with a semicolon, not the usual space.
    pub fn authorization_header(&self) -> String {
        format!("Bearer; {}", self.access_token.as_str())
    }

    /// Envelope template for this client; request id, text and operation
    /// are filled in per call.
    pub fn request_template(&self) -> RequestEnvelope {
        RequestEnvelope {
            app: AppSection {
                appid: self.app_id.clone(),
                token: self.access_token.as_str().to_string(),
                cluster: self.cluster.clone(),
            },
            user: UserSection {
                uid: self.user_id.clone(),
            },
            audio: AudioSection {
                voice_type: self.voice_type.clone(),
                encoding: self.encoding.as_str().to_string(),
                speed_ratio: self.speed_ratio,
                volume_ratio: self.volume_ratio,
                pitch_ratio: self.pitch_ratio,
            },
            request: RequestSection {
                reqid: String::new(),
                text: String::new(),
                text_type: self.text_type.clone(),
                operation: Operation::Submit,
            },
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> TTSResult<()> {
    if value.trim().is_empty() {
        return Err(TTSError::InvalidConfiguration(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn require_range(field: &str, value: f64, (min, max): (f64, f64)) -> TTSResult<()> {
    if !(min..=max).contains(&value) {
        return Err(TTSError::InvalidConfiguration(format!(
            "{field} {value} is outside supported range ({min}-{max})"
        )));
    }
    Ok(())
}
