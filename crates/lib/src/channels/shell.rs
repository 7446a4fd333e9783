//! Shell channel: each stdin line is a message from a local user; replies go to stdout.

use crate::channels::inbound::InboundMessage;
use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SHELL_CHANNEL_ID: &str = "shell";

pub struct ShellChannel {
    id: String,
    sender_id: String,
    room_id: String,
    running: AtomicBool,
}

impl ShellChannel {
    pub fn new(sender_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            id: SHELL_CHANNEL_ID.to_string(),
            sender_id: sender_id.into(),
            room_id: room_id.into(),
            running: AtomicBool::new(false),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Read stdin until EOF (or stop), forwarding each non-empty line. The inbound sender is
    /// dropped when the loop ends, so the processor drains and exits.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while self.running() {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("shell: reading stdin failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let inbound = InboundMessage::new(&self.id, &self.sender_id, &self.room_id, line);
                if inbound_tx.send(inbound).await.is_err() {
                    log::debug!("shell: inbound channel closed, stopping loop");
                    break;
                }
            }
            log::debug!("shell: input loop stopped");
        })
    }
}

#[async_trait]
impl ChannelHandle for ShellChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<(), String> {
        let line = format!("[{}] {}\n", room_id, text);
        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes()).await.map_err(|e| e.to_string())?;
        out.flush().await.map_err(|e| e.to_string())
    }
}
