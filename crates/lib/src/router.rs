//! Per-message relay pipeline and the handler dispatcher.
//!
//! Pipeline: sender filter -> conversation flag (or trigger match) -> mention stripping ->
//! backend call -> interpretation -> conversation update -> reply. The conversation update is
//! applied before the reply is returned, so the next message for the room sees it.

use crate::backend::{Backend, BackendClient, BackendRequest};
use crate::brain::Brain;
use crate::channels::InboundMessage;
use crate::config::{ConfigError, RelaySettings};
use crate::conversation::ConversationStore;
use crate::filter::UserFilter;
use crate::interpret::{interpret, Transition};
use crate::trigger::TriggerMatcher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Reply sent to the room when the backend cannot be reached or answers with an error.
pub const ERROR_REPLY: &str = "Unable to communicate with the backend.";

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Sender is on the ignore list.
    Suppressed,
    /// Room idle and text did not match the trigger.
    NotForUs,
    /// Backend answered; the room's conversation was updated.
    Relayed {
        transition: Transition,
        reply: Option<String>,
    },
    /// Backend call failed; conversation untouched.
    Failed,
}

impl Outcome {
    /// Text to send back to the room, if any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Outcome::Relayed { reply, .. } => reply.as_deref(),
            Outcome::Failed => Some(ERROR_REPLY),
            Outcome::Suppressed | Outcome::NotForUs => None,
        }
    }
}

/// Strip a leading bot mention (`@name`, `name:`, `name,`, `name `) case-insensitively, then trim.
pub fn strip_mention(text: &str, bot_names: &[String]) -> String {
    let trimmed = text.trim();
    let unprefixed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    for name in bot_names {
        let name = name.trim().trim_start_matches('@');
        if name.is_empty() {
            continue;
        }
        let Some(rest) = strip_prefix_ignore_case(unprefixed, name) else {
            continue;
        };
        match rest.chars().next() {
            None => return String::new(),
            Some(c) if c.is_whitespace() || c == ':' || c == ',' => {
                return rest.trim_start_matches([':', ',']).trim().to_string();
            }
            _ => {}
        }
    }
    trimmed.to_string()
}

/// `text` without its leading `prefix`, comparing char by char with Unicode lowercase folding.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.chars();
    for expected in prefix.chars() {
        let actual = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.as_str())
}

/// The relay: decides per message whether to call the backend and what to answer.
pub struct Relay {
    filter: UserFilter,
    trigger: TriggerMatcher,
    conversations: ConversationStore,
    backend: Arc<dyn Backend>,
    bot_names: Vec<String>,
}

impl Relay {
    pub fn new(
        filter: UserFilter,
        trigger: TriggerMatcher,
        conversations: ConversationStore,
        backend: Arc<dyn Backend>,
        bot_names: Vec<String>,
    ) -> Self {
        Self {
            filter,
            trigger,
            conversations,
            backend,
            bot_names,
        }
    }

    /// Build the relay from resolved settings. Fails only when the backend URL is missing.
    pub fn from_settings(settings: &RelaySettings, brain: Arc<dyn Brain>) -> Result<Self, ConfigError> {
        let url = settings.require_backend_url()?;
        let backend: Arc<dyn Backend> = match settings.request_timeout_secs {
            Some(secs) => Arc::new(BackendClient::with_timeout(
                url,
                settings.api_key.clone(),
                Duration::from_secs(secs),
            )),
            None => Arc::new(BackendClient::new(url, settings.api_key.clone())),
        };
        let conversations =
            ConversationStore::new(brain).with_ttl_secs(settings.conversation_ttl_secs);
        Ok(Self::new(
            UserFilter::new(&settings.ignored_sender_ids),
            TriggerMatcher::from_config(settings.start_pattern.as_deref()),
            conversations,
            backend,
            settings.bot_names.clone(),
        ))
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn trigger(&self) -> &TriggerMatcher {
        &self.trigger
    }

    /// Run the pipeline for one message.
    pub async fn process(&self, msg: &InboundMessage) -> Outcome {
        if self.filter.suppresses(&msg.sender_id) {
            log::debug!("relay: ignoring message from sender {}", msg.sender_id);
            return Outcome::Suppressed;
        }
        let active = self.conversations.is_active(&msg.room_id);
        if !active && !self.trigger.is_match(&msg.text) {
            return Outcome::NotForUs;
        }
        let request = BackendRequest {
            text: strip_mention(&msg.text, &self.bot_names),
            sender: msg.sender_id.clone(),
            room: msg.room_id.clone(),
        };
        log::debug!(
            "relay: forwarding message for room {} (conversation active: {})",
            msg.room_id,
            active
        );
        let response = match self.backend.send(&request).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("relay: backend call for room {} failed: {}", msg.room_id, e);
                return Outcome::Failed;
            }
        };
        let interpretation = interpret(&response);
        match interpretation.transition {
            Transition::Start => self.conversations.set(&msg.room_id, true),
            Transition::Stop => self.conversations.set(&msg.room_id, false),
            Transition::Unchanged => {}
        }
        Outcome::Relayed {
            transition: interpretation.transition,
            reply: interpretation.reply,
        }
    }
}

/// Handles a message the dispatcher routed to it; returns the reply, if any.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &InboundMessage) -> Option<String>;
}

#[async_trait]
impl MessageHandler for Relay {
    async fn handle(&self, msg: &InboundMessage) -> Option<String> {
        self.process(msg).await.reply().map(String::from)
    }
}

type Predicate = Box<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

/// (predicate, handler) registrations, evaluated in registration order for every message.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<(Predicate, Arc<dyn MessageHandler>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, predicate: P, handler: Arc<dyn MessageHandler>)
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        self.handlers.push((Box::new(predicate), handler));
    }

    /// Register a handler that sees every message and decides for itself.
    pub fn register_always(&mut self, handler: Arc<dyn MessageHandler>) {
        self.register(|_| true, handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every matching handler in order; returns the replies in the same order.
    pub async fn dispatch(&self, msg: &InboundMessage) -> Vec<String> {
        let mut replies = Vec::new();
        for (predicate, handler) in &self.handlers {
            if !predicate(msg) {
                continue;
            }
            if let Some(reply) = handler.handle(msg).await {
                replies.push(reply);
            }
        }
        replies
    }
}

/// Build the dispatcher for the host. A missing backend URL disables the relay: one error is
/// logged and no handler is registered.
pub fn build_dispatcher(settings: &RelaySettings, brain: Arc<dyn Brain>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    match Relay::from_settings(settings, brain) {
        Ok(relay) => {
            log::info!(
                "relay: enabled (trigger {:?}, {} ignored sender(s))",
                relay.trigger().as_str(),
                settings.ignored_sender_ids.len()
            );
            dispatcher.register_always(Arc::new(relay));
        }
        Err(e) => {
            log::error!("relay: {}; relay disabled", e);
        }
    }
    dispatcher
}
