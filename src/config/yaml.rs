use serde::Deserialize;
use std::path::Path;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// app:
///   app_id: "your-app-id"
///   access_token: "your-access-token"
///   cluster: "volcano_tts"
///   user_id: "tts-user"
///
/// audio:
///   voice_type: "zh_female_sajiaonvyou_moon_bigtts"
///   encoding: "mp3"
///   speed_ratio: 1.0
///   volume_ratio: 1.0
///   pitch_ratio: 1.0
///   text_type: "plain"
///
/// connection:
///   endpoint: "wss://openspeech.bytedance.com/api/v1/tts/ws_binary"
///   compression: "gzip"
///   connect_timeout_seconds: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub app: Option<AppYaml>,
    pub audio: Option<AudioYaml>,
    pub connection: Option<ConnectionYaml>,
}

/// Application identity from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppYaml {
    pub app_id: Option<String>,
    pub access_token: Option<String>,
    pub cluster: Option<String>,
    pub user_id: Option<String>,
}

/// Voice parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub voice_type: Option<String>,
    pub encoding: Option<String>,
    pub speed_ratio: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub pitch_ratio: Option<f64>,
    pub text_type: Option<String>,
}

/// Transport settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionYaml {
    pub endpoint: Option<String>,
    pub compression: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        Self::parse(&contents)
    }

    /// Parse YAML configuration from a string
    pub fn parse(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: YamlConfig = serde_yaml::from_str(contents)
            .map_err(|e| format!("Failed to parse YAML configuration: {e}"))?;
        Ok(config)
    }
}
