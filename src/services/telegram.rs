//! Chat transport.
//!
//! `ChatTransport` is the single seam through which every outbound message
//! flows; the resilient dispatcher owns the retry policy on top of it.
//! `TelegramClient` implements the trait against the Telegram Bot API and
//! also provides the inbound long-poll (`get_updates`) consumed by the
//! update loop in `main.rs`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::services::error::{FetchError, SendError};
use crate::services::http_client;

/// Abstract chat transport: deliver one message to one destination.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// An inbound text message from a user.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub update_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
}

#[derive(Clone)]
pub struct TelegramClient {
    base_url: String,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{}", token))
    }

    /// Test seam: point the client at a stub server.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            http: http_client(),
        }
    }

    /// Long-poll for new updates past `offset`. Non-text updates are
    /// skipped; their update ids still advance the offset.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<InboundMessage>, FetchError> {
        let url = format!("{}/getUpdates", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("offset", offset.to_string()), ("timeout", "30".to_string())])
            // long poll: the server holds the request open for up to 30s
            .timeout(std::time::Duration::from_secs(35))
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Transport(format!(
                "getUpdates returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .json::<UpdatesResponse>()
            .await
            .map_err(|err| FetchError::Malformed(err.to_string()))?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|update| {
                let message = update.message?;
                Some(InboundMessage {
                    update_id: update.update_id,
                    user_id: message.from?.id,
                    chat_id: message.chat.id,
                    text: message.text?,
                })
            })
            .collect())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let url = format!("{}/sendMessage", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|err| SendError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // 429 and server-side failures are worth retrying; any other 4xx
        // (bad chat id, bot blocked) will not get better on retry.
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(SendError::Transient(format!("sendMessage HTTP {}", status)))
        } else {
            Err(SendError::Permanent(format!("sendMessage HTTP {}", status)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}
