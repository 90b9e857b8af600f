//! Relay session state machine.
//!
//! One [`RelaySession`] exists per downstream client. It owns the upstream
//! connection and the task draining it, and is the only place either is closed.
//!
//! ```text
//! Init -> Connecting -> Active -> Closing -> Closed
//!              \________________________________^   (connect failure, client gone)
//! ```
//!
//! While `Active` two directions run independently:
//! - downstream -> upstream on the session's own task, in arrival order
//! - upstream -> downstream on a spawned listener task, in arrival order
//!
//! Nothing orders one direction against the other. An `interrupt` can race a
//! model response that is already in flight; the client may still receive
//! parts of the interrupted turn.

use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::registry::{Registration, SessionId, SessionRegistry};
use crate::core::live::{
    ConnectionState, GeminiLiveClient, LiveConfig, LiveError, LiveResult, UpstreamReceiver,
};
use crate::core::translate::{
    UpstreamTurn, audio_turn, interrupt_turn, parse_server_message, server_message_to_envelopes,
    text_turn,
};
use crate::handlers::relay::messages::{
    DownstreamFrame, DownstreamRoute, IncomingEnvelope, OutgoingEnvelope,
};

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its socket. Nothing more is sent downstream.
    DownstreamClosed,
    /// The upstream stream ended or failed.
    UpstreamClosed,
    /// A write to the upstream connection failed.
    SendFailed,
}

/// How the upstream listener task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerExit {
    UpstreamEnded,
    DownstreamGone,
}

/// One client's relay between the browser socket and the Live API.
pub struct RelaySession {
    id: SessionId,
    state: SessionState,
    config: Arc<LiveConfig>,
    registry: Arc<SessionRegistry>,
    registration: Option<Registration>,
    client: Option<GeminiLiveClient>,
    listener: Option<JoinHandle<ListenerExit>>,
    outgoing: Option<mpsc::Sender<DownstreamRoute>>,
}

impl RelaySession {
    pub fn new(config: Arc<LiveConfig>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Init,
            config,
            registry,
            registration: None,
            client: None,
            listener: None,
            outgoing: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Upstream link state as reported to the client.
    pub fn connection_state(&self) -> ConnectionState {
        match (&self.client, self.state) {
            (Some(client), _) if client.is_ready() => ConnectionState::Connected,
            (None, SessionState::Init | SessionState::Connecting) => ConnectionState::Pending,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Drive the session to completion.
    ///
    /// `incoming` yields frames read from the client socket; it ending counts
    /// as the client disconnecting. Everything for the client goes through
    /// `outgoing`, finishing with [`DownstreamRoute::Close`] unless the client
    /// left first. Returns once the session is `Closed`.
    pub async fn run<S>(&mut self, mut incoming: S, outgoing: mpsc::Sender<DownstreamRoute>)
    where
        S: Stream<Item = DownstreamFrame> + Unpin + Send,
    {
        if self.state != SessionState::Init {
            tracing::warn!(session_id = %self.id, state = %self.state, "Session already started");
            return;
        }

        self.outgoing = Some(outgoing.clone());
        self.registration = Some(self.registry.register_scoped(self.id));
        self.transition(SessionState::Connecting);

        // The client may speak or leave before the upstream link exists.
        // Its text frames are held for replay; leaving abandons the attempt.
        let mut pending = Vec::new();
        let attempt = {
            let connect = self.open_upstream();
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break Some(result),
                    frame = incoming.next() => match frame {
                        Some(DownstreamFrame::Text(text)) => pending.push(text),
                        Some(DownstreamFrame::Close) | None => break None,
                    },
                }
            }
        };

        let Some(attempt) = attempt else {
            tracing::info!(session_id = %self.id, "Client disconnected while connecting");
            self.finish().await;
            return;
        };

        let mut client = match attempt {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(session_id = %self.id, "Failed to connect to Gemini: {}", e);
                self.emit(OutgoingEnvelope::error(format!(
                    "Failed to connect to AI service: {e}"
                )))
                .await;
                self.finish().await;
                return;
            }
        };

        let Some(receiver) = client.take_receiver() else {
            tracing::error!(session_id = %self.id, "Upstream receiver unavailable");
            client.close().await;
            self.emit(OutgoingEnvelope::error("Failed to connect to AI service"))
                .await;
            self.finish().await;
            return;
        };

        self.client = Some(client);
        self.transition(SessionState::Active);
        self.emit(OutgoingEnvelope::connected()).await;

        let mut listener = tokio::spawn(forward_upstream(self.id, receiver, outgoing));

        let mut replay_failure = None;
        for text in pending {
            if let Err(reason) = self.handle_downstream_text(&text).await {
                replay_failure = Some(reason);
                break;
            }
        }

        let (reason, listener_done) = match replay_failure {
            Some(reason) => (reason, false),
            None => loop {
                tokio::select! {
                    frame = incoming.next() => match frame {
                        Some(DownstreamFrame::Text(text)) => {
                            if let Err(reason) = self.handle_downstream_text(&text).await {
                                break (reason, false);
                            }
                        }
                        Some(DownstreamFrame::Close) | None => {
                            tracing::info!(session_id = %self.id, "Client disconnected");
                            break (CloseReason::DownstreamClosed, false);
                        }
                    },
                    exit = &mut listener => {
                        let reason = match exit {
                            Ok(ListenerExit::DownstreamGone) => CloseReason::DownstreamClosed,
                            Ok(ListenerExit::UpstreamEnded) => CloseReason::UpstreamClosed,
                            Err(e) => {
                                tracing::error!(session_id = %self.id, "Upstream listener failed: {}", e);
                                CloseReason::UpstreamClosed
                            }
                        };
                        break (reason, true);
                    }
                }
            },
        };

        if !listener_done {
            self.listener = Some(listener);
        }
        self.teardown(reason).await;
    }

    /// Close everything the session owns and leave it `Closed`.
    ///
    /// Idempotent: a second call produces no output.
    pub async fn teardown(&mut self, reason: CloseReason) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }

        tracing::info!(session_id = %self.id, ?reason, link = %self.connection_state(), "Closing session");
        self.transition(SessionState::Closing);

        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
        if let Some(client) = self.client.take() {
            client.close().await;
        }

        if matches!(
            reason,
            CloseReason::UpstreamClosed | CloseReason::SendFailed
        ) {
            self.emit(OutgoingEnvelope::disconnected()).await;
        }

        self.finish().await;
    }

    /// Connect and send setup within the configured deadline.
    async fn open_upstream(&self) -> LiveResult<GeminiLiveClient> {
        let deadline = self.config.connect_timeout;
        let attempt = async {
            let client = GeminiLiveClient::connect(&self.config).await?;
            if let Err(e) = client.send_setup(&self.config.setup_params()).await {
                client.close().await;
                return Err(e);
            }
            Ok(client)
        };

        match timeout(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => Err(LiveError::Timeout(format!(
                "no connection within {}s",
                deadline.as_secs_f32()
            ))),
        }
    }

    /// Handle one client text frame. `Err` ends the session.
    async fn handle_downstream_text(&self, text: &str) -> Result<(), CloseReason> {
        let envelope: IncomingEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session_id = %self.id, "Failed to parse client message: {}", e);
                self.emit(OutgoingEnvelope::error(format!("Invalid message format: {e}")))
                    .await;
                return Ok(());
            }
        };

        if let Err(e) = envelope.validate() {
            tracing::warn!(session_id = %self.id, kind = envelope.kind(), "Message validation failed: {}", e);
            self.emit(OutgoingEnvelope::error(e.to_string())).await;
            return Ok(());
        }

        let turn = match envelope {
            IncomingEnvelope::AudioData { data } => audio_turn(data),
            IncomingEnvelope::TextData { data } => {
                tracing::debug!(session_id = %self.id, bytes = data.len(), "Forwarding text");
                text_turn(data)
            }
            IncomingEnvelope::Interrupt => {
                tracing::debug!(session_id = %self.id, "Forwarding interrupt");
                interrupt_turn()
            }
            IncomingEnvelope::Ping => {
                self.emit(OutgoingEnvelope::Pong).await;
                return Ok(());
            }
            IncomingEnvelope::Unknown => {
                tracing::debug!(session_id = %self.id, "Ignoring unknown message type");
                return Ok(());
            }
        };

        self.forward_turn(turn).await
    }

    async fn forward_turn(&self, turn: UpstreamTurn) -> Result<(), CloseReason> {
        let Some(client) = self.client.as_ref().filter(|c| c.is_ready()) else {
            tracing::warn!(session_id = %self.id, "Upstream not connected, closing session");
            return Err(CloseReason::SendFailed);
        };

        match client
            .send_turn(turn.role, turn.parts, turn.turn_complete)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_disconnect() => {
                tracing::warn!(session_id = %self.id, "Upstream send failed: {}", e);
                Err(CloseReason::SendFailed)
            }
            Err(e) => {
                tracing::error!(session_id = %self.id, "Failed to send turn: {}", e);
                self.emit(OutgoingEnvelope::error(format!("Failed to send to AI service: {e}")))
                    .await;
                Ok(())
            }
        }
    }

    /// Queue an envelope for the client. Returns `false` once the client is gone.
    async fn emit(&self, envelope: OutgoingEnvelope) -> bool {
        match &self.outgoing {
            Some(tx) => tx.send(DownstreamRoute::Envelope(envelope)).await.is_ok(),
            None => false,
        }
    }

    /// Ask the sender to close the client socket, leave the registry, enter `Closed`.
    async fn finish(&mut self) {
        if let Some(tx) = self.outgoing.take() {
            let _ = tx.send(DownstreamRoute::Close).await;
        }
        self.registration.take();
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Drain the upstream stream into the client's outgoing queue.
async fn forward_upstream(
    session_id: SessionId,
    mut receiver: UpstreamReceiver,
    outgoing: mpsc::Sender<DownstreamRoute>,
) -> ListenerExit {
    while let Some(frame) = receiver.recv().await {
        let message = match parse_server_message(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%session_id, "Dropping upstream frame: {}", e);
                continue;
            }
        };

        for envelope in server_message_to_envelopes(message) {
            if outgoing
                .send(DownstreamRoute::Envelope(envelope))
                .await
                .is_err()
            {
                tracing::debug!(%session_id, "Client queue closed, stopping upstream listener");
                return ListenerExit::DownstreamGone;
            }
        }
    }

    tracing::info!(%session_id, "Upstream stream ended");
    ListenerExit::UpstreamEnded
}
