//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Environment variables override the file; see the `resolve_*` functions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Relay settings (backend, trigger, ignored senders).
    #[serde(default)]
    pub relay: RelayConfig,

    /// Reply delivery settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Relay settings as written in the config file. Use [`RelaySettings::resolve`] to apply env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Backend endpoint that receives `POST` requests. Overridden by BACKEND_URL env.
    pub backend_url: Option<String>,
    /// Static credential sent as `x-api-key`. Overridden by BACKEND_API_KEY env.
    pub api_key: Option<String>,
    /// Regular expression that starts a conversation. Overridden by START_PATTERN env.
    pub start_pattern: Option<String>,
    /// Sender ids never relayed (case-insensitive). Overridden by IGNORED_SENDER_IDS env.
    #[serde(default)]
    pub ignored_sender_ids: Vec<String>,
    /// Names the bot answers to; a leading mention of any of them is stripped. Overridden by RELAY_BOT_NAME env.
    #[serde(default = "default_bot_names")]
    pub bot_names: Vec<String>,
    /// Process each room's messages strictly in order (default true). When false, in-flight
    /// requests for the same room may race and the last response wins.
    #[serde(default = "default_serialize_rooms")]
    pub serialize_rooms: bool,
    /// Seconds after which an active conversation is treated as idle. Unset = never expires.
    pub conversation_ttl_secs: Option<u64>,
    /// Backend request timeout in seconds. Unset = transport default.
    pub request_timeout_secs: Option<u64>,
    /// Where the JSON brain is persisted. Unset = in-memory only.
    pub brain_path: Option<PathBuf>,
}

fn default_bot_names() -> Vec<String> {
    vec!["relay".to_string()]
}

fn default_serialize_rooms() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            start_pattern: None,
            ignored_sender_ids: Vec::new(),
            bot_names: default_bot_names(),
            serialize_rooms: default_serialize_rooms(),
            conversation_ttl_secs: None,
            request_timeout_secs: None,
            brain_path: None,
        }
    }
}

/// Reply delivery config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub webhook: WebhookChannelConfig,
}

/// Webhook channel: replies for messages received on `POST /messages` are POSTed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookChannelConfig {
    /// Callback URL for replies. When unset, replies are only logged.
    pub reply_url: Option<String>,
}

/// Relay settings after env overrides have been applied. Read once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelaySettings {
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub start_pattern: Option<String>,
    pub ignored_sender_ids: Vec<String>,
    pub bot_names: Vec<String>,
    pub serialize_rooms: bool,
    pub conversation_ttl_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub brain_path: Option<PathBuf>,
}

impl RelaySettings {
    /// Resolve settings from config and the process environment.
    pub fn resolve(config: &RelayConfig) -> Self {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    /// Resolve settings from config and an arbitrary key lookup (env-style names).
    pub fn resolve_with<F>(config: &RelayConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |keys: &[&str]| keys.iter().find_map(|k| non_empty(lookup(k)));
        let backend_url = env(&["BACKEND_URL", "LEX_API_URL"])
            .or_else(|| non_empty(config.backend_url.clone()));
        let api_key =
            env(&["BACKEND_API_KEY", "LEX_API_KEY"]).or_else(|| non_empty(config.api_key.clone()));
        let start_pattern = env(&["START_PATTERN", "LEX_START_REGEXP"])
            .or_else(|| non_empty(config.start_pattern.clone()));
        let ignored_sender_ids = match env(&["IGNORED_SENDER_IDS", "LEX_IGNORE_USER_IDS"]) {
            Some(list) => split_list(&list),
            None => config
                .ignored_sender_ids
                .iter()
                .flat_map(|s| split_list(s))
                .collect(),
        };
        let bot_names = match env(&["RELAY_BOT_NAME"]) {
            Some(list) => split_list(&list),
            None => config.bot_names.clone(),
        };
        Self {
            backend_url,
            api_key,
            start_pattern,
            ignored_sender_ids,
            bot_names,
            serialize_rooms: config.serialize_rooms,
            conversation_ttl_secs: config.conversation_ttl_secs,
            request_timeout_secs: config.request_timeout_secs,
            brain_path: config.brain_path.clone(),
        }
    }
}

/// Relay configuration that prevents the feature from activating.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BACKEND_URL is not configured")]
    MissingBackendUrl,
}

impl RelaySettings {
    /// The backend URL, required for the relay to activate.
    pub fn require_backend_url(&self) -> Result<&str, ConfigError> {
        self.backend_url
            .as_deref()
            .ok_or(ConfigError::MissingBackendUrl)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the brain file path; relative paths are resolved against the config file's parent.
pub fn resolve_brain_path(settings: &RelaySettings, config_path: &Path) -> Option<PathBuf> {
    let path = settings.brain_path.as_ref()?;
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.is_absolute() {
        return Some(path.clone());
    }
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some(config_parent.join(path))
}

/// Load config from the given path (or the default path). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
