//! Gemini Live API configuration types.
//!
//! This module contains configuration types for the Live API:
//! - Endpoint and model defaults
//! - Response modality selection
//! - Prebuilt voice selection
//! - Audio MIME types

use serde::{Deserialize, Serialize};

/// Gemini Live API WebSocket endpoint (BidiGenerateContent).
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Default Live model.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Default bound on connect + setup, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default system prompt used when none is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly voice assistant. \
Keep responses conversational, helpful and concise (two or three sentences). \
Use simple, clear language suitable for voice interaction.";

/// MIME type attached to client audio chunks.
pub const INPUT_AUDIO_MIME_TYPE: &str = "audio/pcm";

/// MIME essence recognised as model audio output.
pub const OUTPUT_AUDIO_MIME_ESSENCE: &str = "audio/pcm";

/// Whether an inline-data MIME type denotes PCM audio.
///
/// Parameters are ignored, so `audio/pcm;rate=24000` matches.
pub fn is_pcm_audio(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(OUTPUT_AUDIO_MIME_ESSENCE))
        .unwrap_or(false)
}

// =============================================================================
// Modalities
// =============================================================================

/// Output modality requested in the setup message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Spoken audio output (default)
    #[default]
    Audio,
    /// Text output
    Text,
}

impl ResponseModality {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
            Self::Text => "TEXT",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "TEXT" => Self::Text,
            _ => Self::Audio,
        }
    }
}

impl std::fmt::Display for ResponseModality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices offered by the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    /// Aoede voice (default)
    #[default]
    Aoede,
}

impl GeminiVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "kore" => Self::Kore,
            "fenrir" => Self::Fenrir,
            "aoede" => Self::Aoede,
            _ => Self::default(),
        }
    }

    /// Get all available voices.
    pub fn all() -> &'static [GeminiVoice] {
        &[Self::Puck, Self::Charon, Self::Kore, Self::Fenrir, Self::Aoede]
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
