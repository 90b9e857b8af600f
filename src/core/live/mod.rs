//! Upstream client for the Gemini Live streaming API.
//!
//! - [`GeminiLiveClient`] owns one WebSocket connection and its send path
//! - [`UpstreamReceiver`] is the read half, drained by the relay's listener task
//! - [`messages`] holds the wire types for both directions

mod base;
mod client;
pub mod config;
pub mod messages;

pub use base::{ConnectionState, LiveConfig, LiveError, LiveResult, SetupParams};
pub use client::{GeminiLiveClient, UpstreamReceiver};
pub use config::{GeminiVoice, ResponseModality};
pub use messages::{ClientMessage, Content, Part, ServerContent, ServerMessage};
