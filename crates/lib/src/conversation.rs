//! Per-room conversation flag on top of the shared brain.
//!
//! A room is Active while its key `conversation-<roomId>` holds a start timestamp (epoch
//! millis) and Idle when the key is absent. Starting overwrites any previous value; stopping
//! removes the key.

use crate::brain::Brain;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

const KEY_PREFIX: &str = "conversation-";

/// Brain key for a room's flag.
pub fn conversation_key(room_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, room_id)
}

/// Current value of a room's flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationFlag {
    pub active: bool,
    /// When the conversation started; None if the stored value was not a timestamp.
    pub started_at: Option<DateTime<Utc>>,
}

/// Conversation state store: `get`/`set` per room.
#[derive(Clone)]
pub struct ConversationStore {
    brain: Arc<dyn Brain>,
    ttl: Option<Duration>,
}

impl ConversationStore {
    pub fn new(brain: Arc<dyn Brain>) -> Self {
        Self { brain, ttl: None }
    }

    /// Treat flags older than `ttl_secs` as idle.
    pub fn with_ttl_secs(mut self, ttl_secs: Option<u64>) -> Self {
        self.ttl = ttl_secs.and_then(|s| Duration::try_seconds(i64::try_from(s).ok()?));
        self
    }

    pub fn get(&self, room_id: &str) -> Option<ConversationFlag> {
        self.get_at(room_id, Utc::now())
    }

    /// Like `get`, evaluating the TTL against `now`.
    pub fn get_at(&self, room_id: &str, now: DateTime<Utc>) -> Option<ConversationFlag> {
        let key = conversation_key(room_id);
        let value = self.brain.get(&key)?;
        if value.is_null() {
            return None;
        }
        let started_at = value
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        if let (Some(ttl), Some(at)) = (self.ttl, started_at) {
            if now.signed_duration_since(at) > ttl {
                log::info!("conversation: flag for room {} expired, clearing", room_id);
                self.brain.remove(&key);
                return None;
            }
        }
        Some(ConversationFlag {
            active: true,
            started_at,
        })
    }

    /// True when the room has an active conversation.
    pub fn is_active(&self, room_id: &str) -> bool {
        self.get(room_id).map(|f| f.active).unwrap_or(false)
    }

    /// Start (`true`, stamped with the current time) or stop (`false`) the room's conversation.
    pub fn set(&self, room_id: &str, active: bool) {
        if active {
            self.start_at(room_id, Utc::now());
        } else {
            self.brain.remove(&conversation_key(room_id));
            log::debug!("conversation: stopped for room {}", room_id);
        }
    }

    /// Start the room's conversation with an explicit timestamp.
    pub fn start_at(&self, room_id: &str, at: DateTime<Utc>) {
        self.brain
            .set(&conversation_key(room_id), Value::from(at.timestamp_millis()));
        log::debug!("conversation: started for room {}", room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MemoryBrain;
    use serde_json::json;

    fn store() -> (Arc<MemoryBrain>, ConversationStore) {
        let brain = Arc::new(MemoryBrain::new());
        let store = ConversationStore::new(brain.clone());
        (brain, store)
    }

    #[test]
    fn absent_flag_is_idle() {
        let (_, store) = store();
        assert!(store.get("#test").is_none());
        assert!(!store.is_active("#test"));
    }

    #[test]
    fn start_then_stop() {
        let (brain, store) = store();
        store.set("#test", true);
        let flag = store.get("#test").expect("flag set");
        assert!(flag.active);
        assert!(flag.started_at.is_some());
        assert!(brain.get("conversation-#test").is_some());

        store.set("#test", false);
        assert!(store.get("#test").is_none());
        assert!(brain.get("conversation-#test").is_none());
    }

    #[test]
    fn start_overwrites_previous_value() {
        let (_, store) = store();
        let first = Utc.timestamp_millis_opt(1_000).unwrap();
        let second = Utc.timestamp_millis_opt(2_000).unwrap();
        store.start_at("#test", first);
        store.start_at("#test", second);
        assert_eq!(store.get("#test").unwrap().started_at, Some(second));
    }

    #[test]
    fn rooms_are_independent() {
        let (_, store) = store();
        store.set("#a", true);
        assert!(store.is_active("#a"));
        assert!(!store.is_active("#b"));
    }

    #[test]
    fn non_timestamp_value_still_active() {
        let (brain, store) = store();
        brain.set("conversation-#test", json!("yes"));
        let flag = store.get("#test").unwrap();
        assert!(flag.active);
        assert!(flag.started_at.is_none());
        brain.set("conversation-#test", Value::Null);
        assert!(store.get("#test").is_none());
    }

    #[test]
    fn ttl_expires_old_flags() {
        let (brain, store) = store();
        let store = store.with_ttl_secs(Some(60));
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        store.start_at("#test", start);
        assert!(store.get_at("#test", start + Duration::seconds(30)).is_some());
        assert!(store.get_at("#test", start + Duration::seconds(61)).is_none());
        assert!(brain.get("conversation-#test").is_none());
    }
}
