use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::{TlsYaml, YamlConfig};
use super::{ConfigError, Secret, ServerConfig, TlsConfig};
use crate::core::live::{GeminiVoice, ResponseModality};

/// Merge environment variables (base) with optional YAML overrides, then validate.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let gemini = yaml.gemini.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let api_key = gemini
        .api_key
        .filter(|key| !key.trim().is_empty())
        .or(env.gemini_api_key)
        .map(Secret::from)
        .ok_or(ConfigError::MissingCredential)?;

    let mut config = ServerConfig::new(api_key);

    if let Some(host) = server.host.or(env.host) {
        config.host = host;
    }
    if let Some(port) = server.port.or(env.port) {
        config.port = port;
    }
    config.static_dir = server.static_dir.map(PathBuf::from).or(env.static_dir);
    config.tls = merge_tls(
        server.tls,
        env.tls_cert_path,
        env.tls_key_path,
    )?;

    if let Some(url) = gemini.url.or(env.gemini_live_url) {
        config.gemini_live_url = url;
    }
    if let Some(model) = gemini.model.or(env.gemini_model) {
        config.gemini_model = model;
    }
    if let Some(voice) = gemini.voice.or(env.gemini_voice) {
        config.gemini_voice = GeminiVoice::from_str_or_default(&voice);
        if !config.gemini_voice.as_str().eq_ignore_ascii_case(&voice) {
            tracing::warn!(
                "Unknown voice '{}', falling back to {}",
                voice,
                config.gemini_voice
            );
        }
    }
    if let Some(modality) = gemini
        .response_modality
        .or(env.gemini_response_modality)
    {
        config.gemini_response_modality = ResponseModality::from_str_or_default(&modality);
    }
    if let Some(instruction) = gemini.system_instruction.or(env.system_instruction) {
        config.system_instruction = instruction;
    }
    if let Some(timeout) = gemini
        .connect_timeout_seconds
        .or(env.upstream_connect_timeout_seconds)
    {
        config.upstream_connect_timeout_seconds = timeout;
    }

    config.cors_allowed_origins = security
        .cors_allowed_origins
        .or(env.cors_allowed_origins);
    config.max_websocket_connections = security
        .max_websocket_connections
        .or(env.max_websocket_connections);
    if let Some(limit) = security
        .max_connections_per_ip
        .or(env.max_connections_per_ip)
    {
        config.max_connections_per_ip = limit;
    }

    validate(&config)?;
    Ok(config)
}

fn merge_tls(
    yaml: Option<TlsYaml>,
    env_cert: Option<PathBuf>,
    env_key: Option<PathBuf>,
) -> Result<Option<TlsConfig>, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    if yaml.enabled == Some(false) {
        return Ok(None);
    }

    let cert = yaml.cert_path.map(PathBuf::from).or(env_cert);
    let key = yaml.key_path.map(PathBuf::from).or(env_key);

    match (cert, key) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::IncompleteTls),
    }
}

fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.upstream_connect_timeout_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            key: "UPSTREAM_CONNECT_TIMEOUT_SECS".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.max_connections_per_ip == 0 {
        return Err(ConfigError::InvalidValue {
            key: "MAX_CONNECTIONS_PER_IP".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.max_websocket_connections == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "MAX_WEBSOCKET_CONNECTIONS".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.gemini_model.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "GEMINI_MODEL".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}
