//! Gateway HTTP server (single port).

use crate::brain::open_brain;
use crate::channels::{ChannelRegistry, InboundMessage, WebhookChannel, WEBHOOK_CHANNEL_ID};
use crate::config::{self, Config, RelaySettings};
use crate::processor::{drain_and_stop, spawn_processor};
use crate::router::build_dispatcher;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long shutdown waits for queued messages to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// False when the relay could not be activated (e.g. no backend URL).
    pub relay_enabled: bool,
    /// Sender for inbound messages; the processor task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
}

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundBody {
    pub sender_id: String,
    pub room_id: String,
    pub text: String,
    /// Channel to reply through; defaults to the webhook channel.
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Build the router for the given state.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/messages", post(inbound_http))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C), then lets queued messages finish.
/// `config_path` is used to resolve a relative brain path.
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway: binding to {} without auth; POST /messages is reachable from the network",
            bind
        );
    }

    let settings = RelaySettings::resolve(&config.relay);
    let brain_path = config::resolve_brain_path(&settings, &config_path);
    let brain = open_brain(brain_path.as_deref());
    let dispatcher = Arc::new(build_dispatcher(&settings, brain));
    let relay_enabled = !dispatcher.is_empty();

    let channel_registry = Arc::new(ChannelRegistry::new());
    let webhook = Arc::new(WebhookChannel::new(config.channels.webhook.reply_url.clone()));
    channel_registry.register(webhook).await;

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(64);
    let processor = spawn_processor(
        dispatcher,
        channel_registry.clone(),
        settings.serialize_rooms,
        inbound_rx,
    );

    let state = GatewayState {
        config: Arc::new(config.clone()),
        relay_enabled,
        inbound_tx,
    };

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    drain_and_stop(processor, &channel_registry, DRAIN_TIMEOUT).await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining queued messages");
}

/// POST /messages: queue an inbound chat message.
async fn inbound_http(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let body: InboundBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            log::debug!("gateway: rejecting inbound body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let channel_id = body
        .channel_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| WEBHOOK_CHANNEL_ID.to_string());
    let inbound = InboundMessage::new(channel_id, body.sender_id, body.room_id, body.text);
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let relay = if state.relay_enabled { "enabled" } else { "disabled" };
    Json(json!({
        "runtime": "running",
        "relay": relay,
        "port": state.config.gateway.port,
    }))
}
