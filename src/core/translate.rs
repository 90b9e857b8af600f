//! Translation between client envelopes and Live API messages.
//!
//! Every function here is pure. Network I/O lives in the upstream client and
//! the relay session.

use thiserror::Error;

use crate::core::live::config::{INPUT_AUDIO_MIME_TYPE, is_pcm_audio};
use crate::core::live::messages::USER_ROLE;
use crate::core::live::{Part, ServerMessage};
use crate::handlers::relay::messages::OutgoingEnvelope;

/// An upstream frame that could not be decoded.
///
/// Recoverable: the frame is dropped and the stream keeps flowing.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("upstream frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("upstream frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One content turn bound for the upstream service.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTurn {
    pub role: &'static str,
    pub parts: Vec<Part>,
    pub turn_complete: bool,
}

// =============================================================================
// Downstream -> Upstream
// =============================================================================

/// A complete user turn carrying one PCM audio chunk (already base64).
pub fn audio_turn(data: String) -> UpstreamTurn {
    UpstreamTurn {
        role: USER_ROLE,
        parts: vec![Part::inline_data(INPUT_AUDIO_MIME_TYPE, data)],
        turn_complete: true,
    }
}

/// A complete user turn carrying typed text.
pub fn text_turn(text: String) -> UpstreamTurn {
    UpstreamTurn {
        role: USER_ROLE,
        parts: vec![Part::text(text)],
        turn_complete: true,
    }
}

/// An empty, incomplete turn that asks the model to stop generating.
pub fn interrupt_turn() -> UpstreamTurn {
    UpstreamTurn {
        role: USER_ROLE,
        parts: Vec::new(),
        turn_complete: false,
    }
}

// =============================================================================
// Upstream -> Downstream
// =============================================================================

/// Decode one upstream frame. Unknown shapes decode to [`ServerMessage::Unrecognized`].
pub fn parse_server_message(frame: &[u8]) -> Result<ServerMessage, TranslationError> {
    let text = std::str::from_utf8(frame)?;
    Ok(serde_json::from_str(text)?)
}

/// Map an upstream message to the envelopes the client should see, in order.
///
/// Parts keep their original order. A turn-completion marker is emitted after
/// any parts carried by the same message.
pub fn server_message_to_envelopes(message: ServerMessage) -> Vec<OutgoingEnvelope> {
    match message {
        ServerMessage::SetupComplete => vec![OutgoingEnvelope::SetupComplete],
        ServerMessage::ServerContent(content) => {
            let mut envelopes = Vec::new();

            if let Some(model_turn) = content.model_turn {
                for part in model_turn.parts {
                    match (part.inline_data, part.text) {
                        (Some(blob), _) if is_pcm_audio(&blob.mime_type) => {
                            envelopes.push(OutgoingEnvelope::AudioResponse {
                                audio_data: blob.data,
                            });
                        }
                        (_, Some(text)) => {
                            envelopes.push(OutgoingEnvelope::TextResponse { text });
                        }
                        (Some(blob), None) => {
                            tracing::trace!(mime_type = %blob.mime_type, "Dropping non-audio inline data");
                        }
                        (None, None) => {}
                    }
                }
            }

            if content.turn_complete {
                envelopes.push(OutgoingEnvelope::TurnComplete);
            }

            envelopes
        }
        ServerMessage::Unrecognized => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::messages::ClientMessage;
    use serde_json::json;

    fn wire(turn: UpstreamTurn) -> serde_json::Value {
        serde_json::to_value(ClientMessage::turn(turn.role, turn.parts, turn.turn_complete))
            .unwrap()
    }

    fn envelopes_for(json: &str) -> Vec<OutgoingEnvelope> {
        server_message_to_envelopes(parse_server_message(json.as_bytes()).unwrap())
    }

    #[test]
    fn test_audio_turn_wire_shape() {
        assert_eq!(
            wire(audio_turn("QUJD".to_string())),
            json!({
                "clientContent": {
                    "turns": [{
                        "role": "user",
                        "parts": [{ "inlineData": { "mimeType": "audio/pcm", "data": "QUJD" } }]
                    }],
                    "turnComplete": true
                }
            })
        );
    }

    #[test]
    fn test_text_turn_wire_shape() {
        let turn = text_turn("hello".to_string());
        assert_eq!(turn.parts.len(), 1);
        assert_eq!(turn.parts[0].text.as_deref(), Some("hello"));
        assert!(turn.turn_complete);
        assert_eq!(turn.role, "user");
    }

    #[test]
    fn test_interrupt_turn_wire_shape() {
        let turn = interrupt_turn();
        assert!(turn.parts.is_empty());
        assert!(!turn.turn_complete);

        assert_eq!(wire(turn), json!({ "clientContent": { "turnComplete": false } }));
    }

    #[test]
    fn test_setup_complete_envelope() {
        assert_eq!(
            envelopes_for(r#"{"setupComplete": {}}"#),
            vec![OutgoingEnvelope::SetupComplete]
        );
    }

    #[test]
    fn test_interleaved_parts_preserve_order() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"text": "one"},
            {"inlineData": {"mimeType": "audio/pcm", "data": "AA=="}},
            {"text": "two"},
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQ=="}},
            {"inlineData": {"mimeType": "audio/pcm", "data": "Ag=="}}
        ]}}}"#;

        assert_eq!(
            envelopes_for(json),
            vec![
                OutgoingEnvelope::TextResponse { text: "one".into() },
                OutgoingEnvelope::AudioResponse { audio_data: "AA==".into() },
                OutgoingEnvelope::TextResponse { text: "two".into() },
                OutgoingEnvelope::AudioResponse { audio_data: "AQ==".into() },
                OutgoingEnvelope::AudioResponse { audio_data: "Ag==".into() },
            ]
        );
    }

    #[test]
    fn test_turn_complete_after_parts() {
        let json = r#"{"serverContent": {
            "modelTurn": {"parts": [{"text": "done"}]},
            "turnComplete": true
        }}"#;

        assert_eq!(
            envelopes_for(json),
            vec![
                OutgoingEnvelope::TextResponse { text: "done".into() },
                OutgoingEnvelope::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_turn_complete_only() {
        assert_eq!(
            envelopes_for(r#"{"serverContent": {"turnComplete": true}}"#),
            vec![OutgoingEnvelope::TurnComplete]
        );
    }

    #[test]
    fn test_non_audio_inline_data_dropped() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "iVBO"}}
        ]}}}"#;
        assert!(envelopes_for(json).is_empty());
    }

    #[test]
    fn test_unrecognized_messages_dropped() {
        assert!(envelopes_for(r#"{"toolCall": {}}"#).is_empty());
        assert!(envelopes_for(r#"{"serverContent": {}}"#).is_empty());
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        match parse_server_message(b"not json") {
            Err(TranslationError::InvalidJson(_)) => {}
            _ => panic!("Expected InvalidJson"),
        }
        match parse_server_message(&[0xff, 0xfe, 0x00]) {
            Err(TranslationError::InvalidUtf8(_)) => {}
            _ => panic!("Expected InvalidUtf8"),
        }
    }
}
