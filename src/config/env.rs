use std::env;
use std::str::FromStr;

use zeroize::Zeroizing;

use super::{AudioEncoding, TtsClientConfig};
use crate::protocol::CompressionMethod;

pub(super) const ENV_ENDPOINT: &str = "DOUBAO_ENDPOINT";
pub(super) const ENV_APP_ID: &str = "DOUBAO_APPID";
pub(super) const ENV_TOKEN: &str = "DOUBAO_TOKEN";
pub(super) const ENV_CLUSTER: &str = "DOUBAO_CLUSTER";
pub(super) const ENV_USER_ID: &str = "DOUBAO_UID";
pub(super) const ENV_VOICE_TYPE: &str = "DOUBAO_VOICE_TYPE";
pub(super) const ENV_ENCODING: &str = "DOUBAO_ENCODING";
pub(super) const ENV_SPEED_RATIO: &str = "DOUBAO_SPEED_RATIO";
pub(super) const ENV_VOLUME_RATIO: &str = "DOUBAO_VOLUME_RATIO";
pub(super) const ENV_PITCH_RATIO: &str = "DOUBAO_PITCH_RATIO";
pub(super) const ENV_TEXT_TYPE: &str = "DOUBAO_TEXT_TYPE";
pub(super) const ENV_COMPRESSION: &str = "DOUBAO_COMPRESSION";
pub(super) const ENV_CONNECT_TIMEOUT: &str = "DOUBAO_CONNECT_TIMEOUT_SECONDS";

/// Overlay environment variables onto `config`.
pub(super) fn apply_env(config: &mut TtsClientConfig) -> Result<(), String> {
    if let Some(value) = string_var(ENV_ENDPOINT) {
        config.endpoint = value;
    }
    if let Some(value) = string_var(ENV_APP_ID) {
        config.app_id = value;
    }
    if let Some(value) = string_var(ENV_TOKEN) {
        config.access_token = Zeroizing::new(value);
    }
    if let Some(value) = string_var(ENV_CLUSTER) {
        config.cluster = value;
    }
    if let Some(value) = string_var(ENV_USER_ID) {
        config.user_id = value;
    }
    if let Some(value) = string_var(ENV_VOICE_TYPE) {
        config.voice_type = value;
    }
    if let Some(value) = string_var(ENV_ENCODING) {
        config.encoding = AudioEncoding::parse(&value)
            .ok_or_else(|| format!("{ENV_ENCODING}: unsupported audio encoding '{value}'"))?;
    }
    if let Some(value) = parsed_var::<f64>(ENV_SPEED_RATIO)? {
        config.speed_ratio = value;
    }
    if let Some(value) = parsed_var::<f64>(ENV_VOLUME_RATIO)? {
        config.volume_ratio = value;
    }
    if let Some(value) = parsed_var::<f64>(ENV_PITCH_RATIO)? {
        config.pitch_ratio = value;
    }
    if let Some(value) = string_var(ENV_TEXT_TYPE) {
        config.text_type = value;
    }
    if let Some(value) = string_var(ENV_COMPRESSION) {
        config.compression = CompressionMethod::from_str_opt(&value)
            .ok_or_else(|| format!("{ENV_COMPRESSION}: unsupported compression '{value}'"))?;
    }
    if let Some(value) = parsed_var::<u64>(ENV_CONNECT_TIMEOUT)? {
        config.connect_timeout_seconds = value;
    }
    Ok(())
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match string_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{name}: invalid value '{value}': {e}")),
        None => Ok(None),
    }
}
