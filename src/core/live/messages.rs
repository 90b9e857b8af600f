//! Gemini Live API WebSocket message types.
//!
//! All messages are JSON objects keyed by a single top-level field.
//!
//! # Protocol Overview
//!
//! Client messages (sent to the provider):
//! - `setup` - one-time session setup (model, modalities, voice, system prompt)
//! - `clientContent` - a conversational turn (role + ordered parts) and a `turnComplete` flag
//!
//! Server messages (received from the provider):
//! - `setupComplete` - setup acknowledged
//! - `serverContent` - model turn parts and/or a `turnComplete` marker
//!
//! Any other server message is decoded as [`ServerMessage::Unrecognized`] so that
//! new provider fields never break the relay.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use super::base::SetupParams;
use super::config::ResponseModality;

/// Role used for client-originated turns.
pub const USER_ROLE: &str = "user";

// =============================================================================
// Content
// =============================================================================

/// Inline binary payload (base64 in JSON).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    /// Base64-encoded bytes
    #[serde(default)]
    pub data: String,
}

/// One content part: text or inline data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    /// A text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    /// An inline-data part carrying an already base64-encoded payload.
    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// A role plus an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

// =============================================================================
// Client Messages (sent to the provider)
// =============================================================================

/// Client messages sent to the Live API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session setup, sent exactly once per connection
    Setup(Setup),
    /// Conversational turn
    ClientContent(ClientContent),
}

impl ClientMessage {
    /// Build the setup message from session parameters.
    pub fn setup(params: &SetupParams) -> Self {
        ClientMessage::Setup(Setup {
            model: params.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![params.response_modality],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: params.voice.as_str().to_string(),
                        },
                    },
                }),
            },
            system_instruction: (!params.system_instruction.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::text(params.system_instruction.clone())],
            }),
        })
    }

    /// Build a content turn.
    ///
    /// An empty `parts` list produces a message with no `turns` key at all.
    pub fn turn(role: &str, parts: Vec<Part>, turn_complete: bool) -> Self {
        let turns = if parts.is_empty() {
            Vec::new()
        } else {
            vec![Content {
                role: Some(role.to_string()),
                parts,
            }]
        };
        ClientMessage::ClientContent(ClientContent {
            turns,
            turn_complete,
        })
    }
}

/// Setup payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Turn payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

// =============================================================================
// Server Messages (received from the provider)
// =============================================================================

/// Server messages received from the Live API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawServerMessage")]
pub enum ServerMessage {
    /// Setup acknowledged
    SetupComplete,
    /// Model output and/or turn completion
    ServerContent(ServerContent),
    /// Any shape the relay does not act on
    Unrecognized,
}

/// Model output carried by a `serverContent` message.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
}

/// Wire shape before classification. Unknown keys are ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerMessage {
    /// Set whenever the key appears, whatever its value (`null` included).
    #[serde(default, deserialize_with = "key_present")]
    setup_complete: bool,
    #[serde(default)]
    server_content: Option<ServerContent>,
}

impl From<RawServerMessage> for ServerMessage {
    fn from(raw: RawServerMessage) -> Self {
        if let Some(content) = raw.server_content {
            ServerMessage::ServerContent(content)
        } else if raw.setup_complete {
            ServerMessage::SetupComplete
        } else {
            ServerMessage::Unrecognized
        }
    }
}

fn key_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

// =============================================================================
// Tests
// =============================================================================
