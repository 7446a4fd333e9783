//! Integration test: serve the gateway router on a free port, probe health and post messages.
//! Does not require a backend; inbound messages are read straight off the queue.

use relay::channels::InboundMessage;
use relay::config::Config;
use relay::gateway::{app, GatewayState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn start(relay_enabled: bool) -> (String, mpsc::Receiver<InboundMessage>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    let mut config = Config::default();
    config.gateway.port = port;
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let state = GatewayState {
        config: Arc::new(config),
        relay_enabled,
        inbound_tx,
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app(state)).await;
    });
    (format!("http://127.0.0.1:{}", port), inbound_rx)
}

#[tokio::test]
async fn health_reports_relay_state() {
    let (base, _rx) = start(false).await;
    let resp = reqwest::get(format!("{}/", base)).await.expect("GET /");
    assert!(resp.status().is_success());
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("relay").and_then(|v| v.as_str()), Some("disabled"));
}

#[tokio::test]
async fn posted_message_is_queued() {
    let (base, mut rx) = start(true).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/messages", base))
        .json(&serde_json::json!({
            "senderId": "1",
            "roomId": "#test",
            "text": "@relay lex hello"
        }))
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(resp.status().as_u16(), 202);

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message within 5s")
        .expect("queue open");
    assert_eq!(
        msg,
        InboundMessage::new("webhook", "1", "#test", "@relay lex hello")
    );
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (base, _rx) = start(true).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/messages", base))
        .body("{\"text\": 1}")
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn closed_queue_is_unavailable() {
    let (base, rx) = start(true).await;
    drop(rx);
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/messages", base))
        .json(&serde_json::json!({"senderId": "1", "roomId": "#test", "text": "lex"}))
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(resp.status().as_u16(), 503);
}
