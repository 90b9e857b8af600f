//! Browser-facing relay WebSocket
//!
//! Clients connect to `GET /ws` and exchange JSON envelopes tagged by `type`.
//!
//! # Client to server
//!
//! ```json
//! {"type": "audio_data", "data": "<base64 PCM16>"}
//! {"type": "text_data", "data": "Hello"}
//! {"type": "interrupt"}
//! {"type": "ping"}
//! ```
//!
//! # Server to client
//!
//! ```json
//! {"type": "connection_status", "status": "connected"}
//! {"type": "audio_response", "audio_data": "<base64 PCM16>"}
//! {"type": "text_response", "text": "Hi there"}
//! {"type": "turn_complete"}
//! {"type": "pong"}
//! {"type": "error", "message": "..."}
//! ```

mod handler;
pub mod messages;

pub use handler::relay_handler;
