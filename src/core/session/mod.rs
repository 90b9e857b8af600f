//! Per-client relay sessions and the registry that counts them.

mod registry;
mod relay;

pub use registry::{Registration, SessionId, SessionRegistry};
pub use relay::{CloseReason, RelaySession, SessionState};
