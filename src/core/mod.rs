pub mod live;
pub mod session;
pub mod translate;

// Re-export commonly used types for convenience
pub use live::{
    ConnectionState, GeminiLiveClient, LiveConfig, LiveError, LiveResult, UpstreamReceiver,
};
pub use session::{CloseReason, RelaySession, SessionId, SessionRegistry, SessionState};
pub use translate::TranslationError;
