//! Backend client: one JSON POST per relayed message.
//! Transport failures and non-200 answers are folded into [`ClientError`]; nothing is retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Message text with the bot mention stripped.
    pub text: String,
    /// Sender id.
    pub sender: String,
    /// Room id.
    pub room: String,
}

/// Where the backend's multi-turn dialog stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    ConfirmIntent,
    ElicitSlot,
    ElicitIntent,
    Failed,
    Fulfilled,
    ReadyForFulfillment,
    /// Any value this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Successful backend answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_state: Option<DialogState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },
}

/// Anything that can answer a [`BackendRequest`]. Implemented by [`BackendClient`]; tests use fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the conversational backend.
#[derive(Clone)]
pub struct BackendClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Client with a request timeout; falls back to the transport default if the builder fails.
    pub fn with_timeout(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("backend: could not apply timeout ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    /// POST the request as JSON. Non-200 answers become `ClientError::Backend` with the body's
    /// `message` when it has one; a 200 body that is not a valid response is reported the same way.
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, ClientError> {
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;
        if status != reqwest::StatusCode::OK {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            return Err(ClientError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            log::debug!("backend: unparseable 200 body: {}", e);
            ClientError::Backend {
                status: status.as_u16(),
                message: "invalid response body".to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_flat() {
        let req = BackendRequest {
            text: "lex hello".to_string(),
            sender: "1".to_string(),
            room: "#test".to_string(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, serde_json::json!({"text": "lex hello", "sender": "1", "room": "#test"}));
    }

    #[test]
    fn response_parses_known_and_unknown_states() {
        let r: BackendResponse =
            serde_json::from_str(r#"{"dialogState":"ElicitSlot","message":"Which size?"}"#).unwrap();
        assert_eq!(r.dialog_state, Some(DialogState::ElicitSlot));
        assert_eq!(r.message.as_deref(), Some("Which size?"));

        let r: BackendResponse = serde_json::from_str(r#"{"dialogState":"Thinking"}"#).unwrap();
        assert_eq!(r.dialog_state, Some(DialogState::Unknown));
        assert!(r.message.is_none());

        let r: BackendResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(r, BackendResponse::default());
    }
}
