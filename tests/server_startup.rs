//! Server Startup Tests
//!
//! Configuration refusal, the HTTP surface and full WebSocket round trips
//! through a real listener, with a mock Live endpoint upstream.

mod mock_upstream;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::json;
use serial_test::serial;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::util::ServiceExt;

use mock_upstream::{MockUpstream, WAIT};
use voice_relay::config::ConfigError;
use voice_relay::handlers::relay::messages::{LinkStatus, OutgoingEnvelope};
use voice_relay::{ServerConfig, routes, state::AppState};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn config_for(upstream_url: String) -> ServerConfig {
    let mut config = ServerConfig::new("test-key");
    config.host = "127.0.0.1".to_string();
    config.gemini_live_url = upstream_url;
    config
}

async fn spawn_server(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(config);
    let app = routes::create_app(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

/// Next envelope from the relay; `None` once the relay closes the socket.
async fn next_envelope(socket: &mut ClientSocket) -> Option<OutgoingEnvelope> {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for relay message")?;
        match message {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn send_json(socket: &mut ClientSocket, value: serde_json::Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
#[serial]
fn test_missing_credential_refuses_to_start() {
    unsafe {
        std::env::remove_var("GEMINI_API_KEY");
    }

    match ServerConfig::from_env() {
        Err(ConfigError::MissingCredential) => {}
        other => panic!("Expected MissingCredential, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_yaml_without_credential_refuses_to_start() {
    unsafe {
        std::env::remove_var("GEMINI_API_KEY");
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "server:\n  port: 9000\ngemini:\n  voice: Puck\n").unwrap();

    match ServerConfig::from_file(&path) {
        Err(ConfigError::MissingCredential) => {}
        other => panic!("Expected MissingCredential, got {other:?}"),
    }
}

// =============================================================================
// HTTP surface
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let state = AppState::new(ServerConfig::new("test-key"));
    let app = routes::create_app(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .unwrap(),
        "nosniff"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, json!({"status": "healthy", "active_sessions": 0}));
}

// =============================================================================
// WebSocket relay
// =============================================================================

#[tokio::test]
async fn test_websocket_round_trip() {
    let mut upstream = MockUpstream::start().await;
    let (addr, state) = spawn_server(config_for(upstream.url())).await;

    let mut client = connect_client(addr).await;
    assert_eq!(
        next_envelope(&mut client).await,
        Some(OutgoingEnvelope::ConnectionStatus {
            status: LinkStatus::Connected
        })
    );
    assert_eq!(state.active_sessions(), 1);
    assert_eq!(state.ws_connection_count(), 1);

    let setup = upstream.next_frame().await;
    assert_eq!(setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"], "Aoede");

    send_json(&mut client, json!({"type": "ping"})).await;
    assert_eq!(next_envelope(&mut client).await, Some(OutgoingEnvelope::Pong));

    send_json(&mut client, json!({"type": "text_data", "data": "hi"})).await;
    let turn = upstream.next_frame().await;
    assert_eq!(turn["clientContent"]["turns"][0]["parts"][0]["text"], "hi");

    upstream.send_json(json!({
        "serverContent": {
            "modelTurn": {"parts": [{"text": "hello there"}]},
            "turnComplete": true
        }
    }));
    assert_eq!(
        next_envelope(&mut client).await,
        Some(OutgoingEnvelope::TextResponse {
            text: "hello there".into()
        })
    );
    assert_eq!(
        next_envelope(&mut client).await,
        Some(OutgoingEnvelope::TurnComplete)
    );

    client.close(None).await.unwrap();

    let rest = upstream.frames_until_closed().await;
    assert!(rest.is_empty());
    eventually(|| {
        let state = state.clone();
        async move { state.active_sessions() == 0 && state.ws_connection_count() == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_upstream_unreachable_reports_error_then_closes() {
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let (addr, state) = spawn_server(config_for(format!("ws://{dead_addr}"))).await;
    let mut client = connect_client(addr).await;

    match next_envelope(&mut client).await {
        Some(OutgoingEnvelope::Error { message }) => {
            assert!(message.starts_with("Failed to connect to AI service"));
        }
        other => panic!("Expected error envelope, got {other:?}"),
    }
    assert_eq!(next_envelope(&mut client).await, None);

    eventually(|| {
        let state = state.clone();
        async move { state.active_sessions() == 0 && state.ws_connection_count() == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_per_ip_limit_enforced_on_upgrade() {
    let upstream = MockUpstream::start().await;
    let mut config = config_for(upstream.url());
    config.max_connections_per_ip = 1;
    let (addr, state) = spawn_server(config).await;

    let mut first = connect_client(addr).await;
    assert!(matches!(
        next_envelope(&mut first).await,
        Some(OutgoingEnvelope::ConnectionStatus { .. })
    ));

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 429);
        }
        Err(other) => panic!("Expected HTTP rejection, got {other}"),
        Ok(_) => panic!("Expected second connection to be rejected"),
    }
    assert_eq!(state.ws_connection_count(), 1);

    first.close(None).await.unwrap();
    eventually(|| {
        let state = state.clone();
        async move { state.ws_connection_count() == 0 }
    })
    .await;
}
