//! Relay WebSocket message types
//!
//! This module defines the JSON envelopes exchanged with the browser client.
//! Every envelope carries a `type` discriminator.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed size for text messages (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

/// Maximum allowed size for a base64 audio chunk (10 MB)
pub const MAX_AUDIO_SIZE: usize = 10 * 1024 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingEnvelope {
    /// Chunk of user audio
    AudioData {
        /// Base64-encoded PCM audio
        data: String,
    },

    /// Typed user input
    TextData {
        /// Text content
        data: String,
    },

    /// Stop the current model turn
    Interrupt,

    /// Liveness check, answered locally
    Ping,

    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Upstream link state reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Outgoing WebSocket messages to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingEnvelope {
    /// Upstream link state changed
    ConnectionStatus { status: LinkStatus },

    /// Error notice
    Error { message: String },

    /// Model audio chunk
    AudioResponse {
        /// Base64-encoded PCM audio, passed through from the provider
        audio_data: String,
    },

    /// Model text chunk
    TextResponse { text: String },

    /// Model finished its turn
    TurnComplete,

    /// Upstream acknowledged session setup
    SetupComplete,

    /// Reply to `ping`
    Pong,
}

impl OutgoingEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        OutgoingEnvelope::Error {
            message: message.into(),
        }
    }

    pub fn connected() -> Self {
        OutgoingEnvelope::ConnectionStatus {
            status: LinkStatus::Connected,
        }
    }

    pub fn disconnected() -> Self {
        OutgoingEnvelope::ConnectionStatus {
            status: LinkStatus::Disconnected,
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// Messages queued for the downstream sender task
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamRoute {
    /// JSON envelope
    Envelope(OutgoingEnvelope),
    /// Close the downstream socket
    Close,
}

/// Frames read from the downstream socket, decoupled from the socket type
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamFrame {
    /// Text frame, expected to hold one JSON envelope
    Text(String),
    /// Peer sent a close frame
    Close,
}

// =============================================================================
// Validation
// =============================================================================

/// Error type for envelope validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvelopeValidationError {
    /// Text content exceeds maximum allowed size
    #[error("Text too large: {size} bytes (max: {max} bytes)")]
    TextTooLarge { size: usize, max: usize },

    /// Audio payload exceeds maximum allowed size
    #[error("Audio chunk too large: {size} bytes (max: {max} bytes)")]
    AudioTooLarge { size: usize, max: usize },

    /// Audio payload is not valid base64
    #[error("Audio data is not valid base64")]
    InvalidAudioEncoding,
}

impl IncomingEnvelope {
    /// Validates payload sizes and encoding before anything is forwarded upstream.
    pub fn validate(&self) -> Result<(), EnvelopeValidationError> {
        match self {
            IncomingEnvelope::TextData { data } => {
                let size = data.len();
                if size > MAX_TEXT_SIZE {
                    return Err(EnvelopeValidationError::TextTooLarge {
                        size,
                        max: MAX_TEXT_SIZE,
                    });
                }
            }
            IncomingEnvelope::AudioData { data } => {
                let size = data.len();
                if size > MAX_AUDIO_SIZE {
                    return Err(EnvelopeValidationError::AudioTooLarge {
                        size,
                        max: MAX_AUDIO_SIZE,
                    });
                }
                if BASE64_STANDARD.decode(data).is_err() {
                    return Err(EnvelopeValidationError::InvalidAudioEncoding);
                }
            }
            IncomingEnvelope::Interrupt | IncomingEnvelope::Ping | IncomingEnvelope::Unknown => {}
        }
        Ok(())
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingEnvelope::AudioData { .. } => "audio_data",
            IncomingEnvelope::TextData { .. } => "text_data",
            IncomingEnvelope::Interrupt => "interrupt",
            IncomingEnvelope::Ping => "ping",
            IncomingEnvelope::Unknown => "unknown",
        }
    }
}
