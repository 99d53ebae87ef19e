//! Integration tests for the HTTP status surface.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use conquest::prelude::*;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt; // For `oneshot` method

struct Noop;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Pass;

impl RuleEngine for Noop {
    type Config = ();
    type State = ();
    type Action = Pass;
    type Delta = ();
    type Phase = ();

    fn init(_: &(), _: usize) {}

    fn opening_phase(_: &(), _: usize) {}

    fn apply_action(_: &mut (), _: &(), _: usize, _: Pass) -> Result<Applied<(), ()>, String> {
        Ok(Applied {
            delta: (),
            next: TurnProgress::EndTurn,
        })
    }
}

/// Builds a server, starts its WebSocket side, and returns the status
/// routes plus the WebSocket address.
async fn create_test_server() -> (axum::Router, String) {
    let server = ConquestServerBuilder::new()
        .bind("127.0.0.1:0")
        .without_http()
        .build::<Noop>(())
        .await
        .expect("server should build");
    let app = server.http_router();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (app, addr)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Opens a WebSocket, creates a session and returns its code. The socket
/// is returned so the session keeps its host.
async fn create_session_over_ws(
    addr: &str,
) -> (
    SessionCode,
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();

    for payload in [
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            identity: None,
        },
        ClientMessage::CreateSession {
            display_name: "Ana".into(),
        },
    ] {
        let env = Envelope {
            seq: 0,
            timestamp: 0,
            payload,
        };
        let text = serde_json::to_string(&env).unwrap();
        ws.send(Message::Text(text.into())).await.unwrap();
    }

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out")
            .unwrap()
            .unwrap();
        let env: Envelope<ServerMessage> = serde_json::from_slice(&msg.into_data()).unwrap();
        if let ServerMessage::SessionJoined { code, .. } = env.payload {
            return (code, ws);
        }
    }
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_server().await;

    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_count"], 0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_session_lookup_malformed_code_bad_request() {
    let (app, _) = create_test_server().await;

    let (status, body) = get_json(app, "/sessions/nope").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_session_lookup_unknown_code_not_found() {
    let (app, _) = create_test_server().await;

    let (status, body) = get_json(app, "/sessions/ABC234").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ABC234"));
}

#[tokio::test]
async fn test_session_lookup_returns_summary() {
    let (app, addr) = create_test_server().await;
    let (code, _ws) = create_session_over_ws(&addr).await;

    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_count"], 1);

    // Codes are case-insensitive on the way in.
    let uri = format!("/sessions/{}", code.as_str().to_ascii_lowercase());
    let (status, body) = get_json(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], code.as_str());
    assert_eq!(body["phase"], "LOBBY");
    assert_eq!(body["members"][0]["display_name"], "Ana");
    assert_eq!(body["members"][0]["role"], "HOST");
    assert_eq!(body["turn_number"], 0);
}

#[tokio::test]
async fn test_build_with_http_bind_exposes_address() {
    let server = ConquestServerBuilder::new()
        .bind("127.0.0.1:0")
        .http_bind("127.0.0.1:0")
        .build::<Noop>(())
        .await
        .unwrap();

    let http = server.http_addr().expect("http surface enabled").unwrap();
    assert_ne!(http.port(), 0);
    assert_ne!(http, server.local_addr().unwrap());
}
