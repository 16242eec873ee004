//! Telegram channel over the Bot API, long-polling for updates.
//!
//! Native Rust Telegram Bot API implementation over `reqwest`. Replies go to
//! the originating message and forum topic.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{Channel, IncomingMessage, MessageStream, ReplyTarget};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API (UTF-16 code units).
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Per-request timeout; leaves headroom over a full long-poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel connected to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Result<Self, ChannelError> {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE, REQUEST_TIMEOUT)
    }

    pub(crate) fn with_api_base(
        bot_token: SecretString,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Send a single message chunk, Markdown-first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<(), ChannelError> {
        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&message_body(target, text, Some("Markdown")))
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        let _markdown_err = markdown_resp.text().await.unwrap_or_default();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&message_body(target, text, None))
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            while !tx.is_closed() {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                if data.get("ok").and_then(Value::as_bool) == Some(false) {
                    let description = data
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    tracing::warn!("Telegram getUpdates rejected: {description}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, target: &ReplyTarget, text: &str) -> Result<(), ChannelError> {
        self.send_message_chunk(target, text).await
    }

    async fn send_typing(&self, target: &ReplyTarget) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": target.chat_id,
            "action": "typing"
        });
        if let Some(thread_id) = thread_id_number(target) {
            body["message_thread_id"] = json!(thread_id);
        }

        let resp = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&body)
            .send()
            .await
            .map_err(send_failed)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendChatAction returned {}", resp.status()),
            })
        }
    }

    fn max_message_len(&self) -> usize {
        TELEGRAM_MAX_MESSAGE_LENGTH
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Request errors carry the URL, which embeds the bot token; strip it.
fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.without_url().to_string(),
    }
}

fn thread_id_number(target: &ReplyTarget) -> Option<i64> {
    target.thread_id.as_deref().and_then(|t| t.parse().ok())
}

/// Build a sendMessage body replying to `target`.
fn message_body(target: &ReplyTarget, text: &str, parse_mode: Option<&str>) -> Value {
    let mut body = json!({
        "chat_id": target.chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = json!(mode);
    }
    if let Some(thread_id) = thread_id_number(target) {
        body["message_thread_id"] = json!(thread_id);
    }
    if let Some(message_id) = target.reply_to {
        body["reply_parameters"] = json!({
            "message_id": message_id,
            "allow_sending_without_reply": true
        });
    }
    body
}

/// Extract a text message from a getUpdates entry. Non-text updates yield `None`.
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;

    let mut incoming = IncomingMessage::new("telegram", &chat_id.to_string(), text);

    if let Some(thread_id) = message
        .get("message_thread_id")
        .and_then(Value::as_i64)
        .filter(|id| *id != 0)
    {
        incoming = incoming.with_thread(thread_id.to_string());
    }
    if let Some(message_id) = message.get("message_id").and_then(Value::as_i64) {
        incoming = incoming.with_message_id(message_id);
    }

    let from = message.get("from");
    if let Some(user_id) = from.and_then(|f| f.get("id")).and_then(Value::as_i64) {
        incoming = incoming.with_sender(user_id);
    }
    if let Some(username) = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
    {
        incoming = incoming.with_username(username);
    }

    Some(incoming)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(token: &str) -> TelegramChannel {
        TelegramChannel::new(SecretString::from(token.to_string())).unwrap()
    }

    fn target(thread: Option<&str>, reply_to: Option<i64>) -> ReplyTarget {
        ReplyTarget {
            chat_id: "-100200".into(),
            thread_id: thread.map(String::from),
            reply_to,
        }
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel("fake-token").name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel("123:ABC").api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn telegram_max_len_is_4096() {
        assert_eq!(channel("t").max_message_len(), 4096);
    }

    // ── Request bodies ──────────────────────────────────────────────

    #[test]
    fn message_body_plain_default_thread() {
        let body = message_body(&target(None, None), "hi", None);
        assert_eq!(body, json!({"chat_id": "-100200", "text": "hi"}));
    }

    #[test]
    fn message_body_markdown_in_topic_as_reply() {
        let body = message_body(&target(Some("17"), Some(99)), "hi", Some("Markdown"));
        assert_eq!(body["parse_mode"], "Markdown");
        assert_eq!(body["message_thread_id"], 17);
        assert_eq!(body["reply_parameters"]["message_id"], 99);
        assert_eq!(body["reply_parameters"]["allow_sending_without_reply"], true);
    }

    #[test]
    fn non_numeric_thread_is_not_sent() {
        let body = message_body(&target(Some("default"), None), "hi", None);
        assert!(body.get("message_thread_id").is_none());
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_text_update() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 4242, "username": "alice", "first_name": "Alice"},
                "chat": {"id": -100200, "type": "supergroup"},
                "message_thread_id": 17,
                "text": "/link eve"
            }
        });

        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "-100200");
        assert_eq!(msg.thread_id.as_deref(), Some("17"));
        assert_eq!(msg.message_id, Some(5));
        assert_eq!(msg.sender_id, Some(4242));
        assert_eq!(msg.username.as_deref(), Some("alice"));
        assert_eq!(msg.text, "/link eve");
    }

    #[test]
    fn parse_update_without_thread_uses_default_key() {
        let update = json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "from": {"id": 1},
                "chat": {"id": 1, "type": "private"},
                "text": "hello"
            }
        });

        let msg = parse_update(&update).unwrap();
        assert!(msg.thread_id.is_none());
        assert_eq!(msg.thread_key(), "default");
        assert!(msg.username.is_none());
    }

    #[test]
    fn zero_thread_id_is_ignored() {
        let update = json!({
            "message": {
                "chat": {"id": 1},
                "message_thread_id": 0,
                "text": "hello"
            }
        });
        assert!(parse_update(&update).unwrap().thread_id.is_none());
    }

    #[test]
    fn non_text_updates_are_skipped() {
        let photo = json!({
            "update_id": 12,
            "message": {"chat": {"id": 1}, "photo": []}
        });
        assert!(parse_update(&photo).is_none());

        let edited = json!({"update_id": 13, "edited_message": {"chat": {"id": 1}, "text": "x"}});
        assert!(parse_update(&edited).is_none());
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[test]
    fn request_timeout_outlasts_long_poll() {
        assert!(REQUEST_TIMEOUT > Duration::from_secs(POLL_TIMEOUT_SECS));
    }

    /// Accepts connections and never answers them.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let base = silent_server().await;
        let ch = TelegramChannel::with_api_base(
            SecretString::from("123:SECRET".to_string()),
            &base,
            Duration::from_millis(200),
        )
        .unwrap();

        let result =
            tokio::time::timeout(Duration::from_secs(5), ch.send_text(&target(None, None), "hi"))
                .await
                .expect("request was not bounded by the client timeout");

        let err = result.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
        assert!(!err.to_string().contains("SECRET"), "token leaked: {err}");
    }
}
