//! Base types for the Gemini Live upstream connection.
//!
//! This module defines the error taxonomy, connection configuration and
//! connection state shared by the upstream client and the relay session.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, GEMINI_LIVE_URL,
    GeminiVoice, ResponseModality,
};
use crate::config::Secret;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the upstream Live endpoint.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Configuration is unusable (e.g. missing credential). Raised before any network I/O.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The provider rejected the credential
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The connection is closed or was never established
    #[error("Not connected")]
    NotConnected,

    /// The setup message was already sent on this connection
    #[error("Session setup already sent")]
    HandshakeAlreadySent,

    /// A content turn was attempted before the setup message
    #[error("Session setup must be sent before content turns")]
    HandshakeRequired,

    /// Write or read failure on the socket
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Outbound message could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LiveError {
    /// Whether the error means the connection can no longer carry messages.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, LiveError::NotConnected | LiveError::WebSocketError(_))
    }
}

/// Result type for upstream operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Configuration
// =============================================================================

/// Everything needed to open and set up one upstream session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Pre-shared API key
    pub api_key: Secret,
    /// WebSocket endpoint (without the key query parameter)
    pub endpoint: String,
    /// Model resource name, e.g. `models/gemini-2.0-flash-live-001`
    pub model: String,
    /// Output modality requested from the model
    pub response_modality: ResponseModality,
    /// Prebuilt voice used for audio output
    pub voice: GeminiVoice,
    /// System prompt sent with the setup message
    pub system_instruction: String,
    /// Upper bound on connect + setup
    pub connect_timeout: Duration,
}

impl LiveConfig {
    /// Build a config with defaults for everything but the credential.
    pub fn new(api_key: impl Into<Secret>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            response_modality: ResponseModality::default(),
            voice: GeminiVoice::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Point the client at a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The setup parameters derived from this config.
    pub fn setup_params(&self) -> SetupParams {
        SetupParams {
            model: self.model.clone(),
            response_modality: self.response_modality,
            voice: self.voice,
            system_instruction: self.system_instruction.clone(),
        }
    }
}

/// Parameters of the one-time session setup message.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupParams {
    pub model: String,
    pub response_modality: ResponseModality,
    pub voice: GeminiVoice,
    pub system_instruction: String,
}

// =============================================================================
// Connection State
// =============================================================================

/// Upstream link state as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Connection not yet established
    #[default]
    Pending,
    /// Connected and able to carry messages
    Connected,
    /// Closed by either side
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Pending => write!(f, "pending"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LiveError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));

        assert_eq!(LiveError::NotConnected.to_string(), "Not connected");
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(LiveError::NotConnected.is_disconnect());
        assert!(LiveError::WebSocketError("broken pipe".into()).is_disconnect());
        assert!(!LiveError::HandshakeRequired.is_disconnect());
        assert!(!LiveError::Timeout("connect".into()).is_disconnect());
    }

    #[test]
    fn test_live_config_defaults() {
        let config = LiveConfig::new("key");
        assert_eq!(config.endpoint, GEMINI_LIVE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.voice, GeminiVoice::Aoede);
        assert_eq!(config.response_modality, ResponseModality::Audio);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_setup_params_follow_config() {
        let mut config = LiveConfig::new("key");
        config.voice = GeminiVoice::Puck;
        config.system_instruction = "Be brief".to_string();

        let params = config.setup_params();
        assert_eq!(params.voice, GeminiVoice::Puck);
        assert_eq!(params.system_instruction, "Be brief");
        assert_eq!(params.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Pending.to_string(), "pending");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
