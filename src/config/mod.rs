//! Configuration module for the voice relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations, plus validation
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::live::config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, GEMINI_LIVE_URL,
};
use crate::core::live::{GeminiVoice, LiveConfig, ResponseModality};

mod env;
mod merge;
mod yaml;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port
pub const DEFAULT_PORT: u16 = 8000;
/// Default per-IP WebSocket connection limit
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while loading or validating configuration.
///
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The upstream credential is absent or blank
    #[error("Gemini API key is required: set GEMINI_API_KEY or gemini.api_key in the config file")]
    MissingCredential,

    /// A value is present but cannot be used
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Only one of the two TLS paths was given
    #[error("TLS requires both TLS_CERT_PATH and TLS_KEY_PATH to be set")]
    IncompleteTls,

    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
}

// =============================================================================
// Secret
// =============================================================================

/// A credential that never shows up in `Debug` output and is wiped on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay server, including:
/// - Server settings (host, port, TLS, static files)
/// - Gemini Live settings (credential, endpoint, model, voice, prompt)
/// - Security settings (CORS, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Directory holding the browser front end, served under `/static`
    pub static_dir: Option<PathBuf>,

    // Gemini Live settings
    pub gemini_api_key: Secret,
    pub gemini_live_url: String,
    pub gemini_model: String,
    pub gemini_voice: GeminiVoice,
    pub gemini_response_modality: ResponseModality,
    pub system_instruction: String,
    /// Bound on upstream connect + setup, in seconds
    pub upstream_connect_timeout_seconds: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl ServerConfig {
    /// Build a configuration with defaults for everything except the credential.
    pub fn new(gemini_api_key: impl Into<Secret>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            static_dir: None,
            gemini_api_key: gemini_api_key.into(),
            gemini_live_url: GEMINI_LIVE_URL.to_string(),
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_voice: GeminiVoice::default(),
            gemini_response_modality: ResponseModality::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            upstream_connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            cors_allowed_origins: None,
            max_websocket_connections: None,
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
        }
    }

    /// Load configuration from environment variables
    ///
    /// The .env file is loaded in `main` before this is called, so its values
    /// are visible here as ordinary environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingCredential`] when `GEMINI_API_KEY` is unset or blank,
    /// and [`ConfigError::InvalidValue`] for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        merge::merge_config(None)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - The merged configuration fails validation
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        merge::merge_config(Some(yaml_config))
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Upstream connection settings for one relay session.
    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            api_key: self.gemini_api_key.clone(),
            endpoint: self.gemini_live_url.clone(),
            model: self.gemini_model.clone(),
            response_modality: self.gemini_response_modality,
            voice: self.gemini_voice,
            system_instruction: self.system_instruction.clone(),
            connect_timeout: Duration::from_secs(self.upstream_connect_timeout_seconds),
        }
    }
}
