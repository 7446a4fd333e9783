//! Webhook channel: messages arrive on the gateway's `POST /messages`; replies are POSTed as
//! `{ "roomId", "text" }` to the configured reply URL.

use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

pub const WEBHOOK_CHANNEL_ID: &str = "webhook";

pub struct WebhookChannel {
    id: String,
    reply_url: Option<String>,
    running: AtomicBool,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(reply_url: Option<String>) -> Self {
        Self {
            id: WEBHOOK_CHANNEL_ID.to_string(),
            reply_url: reply_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            running: AtomicBool::new(true),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// POST a reply to the reply URL. Without a reply URL the reply is only logged.
    pub async fn send_message(&self, room_id: &str, text: &str) -> Result<(), String> {
        if !self.running() {
            return Err("webhook channel stopped".to_string());
        }
        let Some(url) = self.reply_url.as_deref() else {
            log::info!("webhook: reply for room {} (no reply url): {}", room_id, text);
            return Ok(());
        };
        let body = serde_json::json!({ "roomId": room_id, "text": text });
        let res = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("reply delivery failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for WebhookChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<(), String> {
        WebhookChannel::send_message(self, room_id, text).await
    }
}
