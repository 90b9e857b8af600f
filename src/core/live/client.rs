//! Gemini Live API client.
//!
//! Owns one WebSocket connection to the BidiGenerateContent endpoint.
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<api key>`
//! - Protocol: WebSocket with JSON messages (text or binary frames)
//! - Audio: PCM 16-bit, base64 encoded in `inlineData` parts
//!
//! The socket is split on connect. The write half stays inside the client and
//! serialises every send behind a lock, so turns go out in call order. The read
//! half is handed out once as an [`UpstreamReceiver`] and is meant to be drained
//! by a dedicated task for the life of the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::base::{LiveConfig, LiveError, LiveResult, SetupParams};
use super::messages::{ClientMessage, Part};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Gemini Live Client
// =============================================================================

/// One upstream Live API connection.
///
/// The `connected` flag is shared with the [`UpstreamReceiver`] so that a close
/// observed on the read side is immediately visible to senders.
pub struct GeminiLiveClient {
    /// Write half of the socket; `None` once closed
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    /// Read half, until taken
    receiver: Option<UpstreamReceiver>,
    /// Lock-free liveness flag
    connected: Arc<AtomicBool>,
    /// Set once the setup message has been written
    handshake_sent: AtomicBool,
}

impl GeminiLiveClient {
    /// Open a connection to the Live endpoint.
    ///
    /// Fails with [`LiveError::InvalidConfiguration`] before any network I/O when
    /// the credential is empty or the endpoint is not a valid URL.
    pub async fn connect(config: &LiveConfig) -> LiveResult<Self> {
        if config.api_key.is_empty() {
            return Err(LiveError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }

        let mut url = Url::parse(&config.endpoint).map_err(|e| {
            LiveError::InvalidConfiguration(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        url.query_pairs_mut()
            .append_pair("key", config.api_key.expose());

        tracing::debug!(endpoint = %config.endpoint, "Connecting to Gemini Live API");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(map_connect_error)?;

        tracing::info!(model = %config.model, "Connected to Gemini Live API");

        let (sink, stream) = ws_stream.split();
        let connected = Arc::new(AtomicBool::new(true));

        Ok(Self {
            sink: Mutex::new(Some(sink)),
            receiver: Some(UpstreamReceiver {
                stream,
                connected: connected.clone(),
            }),
            connected,
            handshake_sent: AtomicBool::new(false),
        })
    }

    /// Whether the connection can still carry messages.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the setup message has been sent.
    pub fn handshake_sent(&self) -> bool {
        self.handshake_sent.load(Ordering::SeqCst)
    }

    /// Send the one-time session setup message.
    pub async fn send_setup(&self, params: &SetupParams) -> LiveResult<()> {
        if self.handshake_sent.swap(true, Ordering::SeqCst) {
            return Err(LiveError::HandshakeAlreadySent);
        }

        self.send(&ClientMessage::setup(params)).await?;
        tracing::debug!(model = %params.model, voice = %params.voice, "Sent session setup");
        Ok(())
    }

    /// Send a content turn.
    ///
    /// `parts` may be empty, which produces a turn with no content.
    pub async fn send_turn(
        &self,
        role: &str,
        parts: Vec<Part>,
        turn_complete: bool,
    ) -> LiveResult<()> {
        if !self.handshake_sent() {
            return Err(LiveError::HandshakeRequired);
        }

        self.send(&ClientMessage::turn(role, parts, turn_complete))
            .await
    }

    /// Take the inbound stream. Returns `None` on every call after the first.
    pub fn take_receiver(&mut self) -> Option<UpstreamReceiver> {
        self.receiver.take()
    }

    /// Close the connection. Safe to call any number of times.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!("Upstream close returned error: {}", e);
            }
            tracing::debug!("Upstream connection closed");
        }
    }

    async fn send(&self, message: &ClientMessage) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }

        let json = serde_json::to_string(message)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(LiveError::NotConnected)?;

        if let Err(e) = sink.send(Message::Text(json.into())).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(LiveError::WebSocketError(e.to_string()));
        }

        Ok(())
    }
}

fn map_connect_error(err: tungstenite::Error) -> LiveError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            LiveError::AuthenticationFailed(format!(
                "upstream rejected credential (HTTP {})",
                response.status()
            ))
        }
        tungstenite::Error::Http(response) => {
            LiveError::ConnectionFailed(format!("upstream returned HTTP {}", response.status()))
        }
        other => LiveError::ConnectionFailed(other.to_string()),
    }
}

// =============================================================================
// Upstream Receiver
// =============================================================================

/// Read half of an upstream connection.
///
/// Yields raw JSON payloads in arrival order. Once it returns `None` the
/// connection is gone and the owning client reports not ready.
pub struct UpstreamReceiver {
    stream: SplitStream<WsStream>,
    connected: Arc<AtomicBool>,
}

impl UpstreamReceiver {
    /// Wait for the next data frame.
    ///
    /// Text and binary frames are both returned as bytes. Control frames are
    /// skipped. Close, read error and end of stream all end the sequence.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Bytes::copy_from_slice(text.as_bytes()));
                }
                Some(Ok(Message::Binary(data))) => return Some(data),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Upstream closed the connection");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!("Upstream read error: {}", e);
                    break;
                }
                None => break,
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        None
    }
}
