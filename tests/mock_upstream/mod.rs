//! Mock Gemini Live endpoint
//!
//! Accepts a single WebSocket connection on an ephemeral port, records every
//! frame the relay writes to it and replays frames scripted by the test.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use voice_relay::core::live::LiveConfig;

/// How long a test waits for the mock to observe something
pub const WAIT: Duration = Duration::from_secs(5);

enum MockCommand {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Handle to a running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<MockCommand>,
    request_uri: Arc<Mutex<Option<String>>>,
}

impl MockUpstream {
    /// Start a mock that accepts the WebSocket handshake.
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Start a mock that answers the handshake with `status`.
    pub async fn rejecting(status: StatusCode) -> Self {
        Self::spawn(Some(status)).await
    }

    async fn spawn(reject_with: Option<StatusCode>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let request_uri = Arc::new(Mutex::new(None));
        let uri_slot = request_uri.clone();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let callback = move |request: &Request, response: Response| {
                *uri_slot.lock() = Some(request.uri().to_string());
                match reject_with {
                    Some(status) => {
                        let mut error = ErrorResponse::new(Some("rejected".to_string()));
                        *error.status_mut() = status;
                        Err(error)
                    }
                    None => Ok(response),
                }
            };

            let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value = serde_json::from_str(text.as_str())
                                .unwrap_or_else(|_| Value::String(text.as_str().to_owned()));
                            let _ = received_tx.send(value);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    command = command_rx.recv() => match command {
                        Some(MockCommand::Text(text)) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(MockCommand::Binary(data)) => {
                            if write.send(Message::Binary(data.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(MockCommand::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            addr,
            received,
            commands,
            request_uri,
        }
    }

    /// Upstream settings pointing the relay at this mock.
    pub fn live_config(&self) -> LiveConfig {
        LiveConfig::new("test-key").with_endpoint(self.url())
    }

    pub fn url(&self) -> String {
        format!("ws://{}/live", self.addr)
    }

    /// Request URI the relay used for the handshake.
    pub fn request_uri(&self) -> Option<String> {
        self.request_uri.lock().clone()
    }

    pub fn send_json(&self, value: Value) {
        let _ = self.commands.send(MockCommand::Text(value.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.commands.send(MockCommand::Text(text.to_string()));
    }

    pub fn send_binary_json(&self, value: Value) {
        let _ = self
            .commands
            .send(MockCommand::Binary(value.to_string().into_bytes()));
    }

    /// Close the upstream side of the connection.
    pub fn close(&self) {
        let _ = self.commands.send(MockCommand::Close);
    }

    /// Next frame written by the relay. Panics if none arrives in time.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("upstream connection closed before a frame arrived")
    }

    /// Wait until the relay closes the connection and return whatever it sent
    /// in the meantime.
    pub async fn frames_until_closed(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        loop {
            match tokio::time::timeout(WAIT, self.received.recv()).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return frames,
                Err(_) => panic!("timed out waiting for upstream close"),
            }
        }
    }
}
