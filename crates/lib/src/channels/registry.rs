//! Reply channels keyed by id. The processor looks up the channel a message arrived on and
//! sends the relay's replies back through it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A transport replies can be delivered through.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Id inbound messages carry in `channel_id` (e.g. "webhook").
    fn id(&self) -> &str;
    /// Stop accepting input and refuse further replies.
    fn stop(&self);
    /// Deliver one reply to a room.
    async fn send_message(&self, room_id: &str, text: &str) -> Result<(), String>;
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn ChannelHandle>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the handle's own id. A channel already registered under that id is stopped.
    pub async fn register(&self, handle: Arc<dyn ChannelHandle>) {
        let id = handle.id().to_string();
        if let Some(old) = self.channels.write().await.insert(id.clone(), handle) {
            log::debug!("channels: replacing channel {}", id);
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        self.channels.read().await.get(id).cloned()
    }

    /// Stop every registered channel. Replies sent afterwards are refused.
    pub async fn stop_all(&self) {
        for handle in self.channels.read().await.values() {
            handle.stop();
        }
    }
}
