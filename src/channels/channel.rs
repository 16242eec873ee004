//! The `Channel` trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;
use crate::store::DEFAULT_THREAD;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// An inbound chat message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel that produced the message.
    pub channel: String,
    /// Chat the message was posted in.
    pub chat_id: String,
    /// Sub-thread (forum topic) id, if any.
    pub thread_id: Option<String>,
    /// Transport id of the message itself, used to reply to it.
    pub message_id: Option<i64>,
    /// Numeric id of the sender.
    pub sender_id: Option<i64>,
    pub username: Option<String>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, chat_id: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            thread_id: None,
            message_id: None,
            sender_id: None,
            username: None,
            text: text.to_string(),
            received_at: Utc::now(),
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Mapping-store key for this message's thread.
    pub fn thread_key(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(DEFAULT_THREAD)
    }

    /// Where replies to this message go.
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            chat_id: self.chat_id.clone(),
            thread_id: self.thread_id.clone(),
            reply_to: self.message_id,
        }
    }
}

/// Destination of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: String,
    pub thread_id: Option<String>,
    /// Message being answered, if the transport supports threading replies.
    pub reply_to: Option<i64>,
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send one text message. `text` must already fit [`Channel::max_message_len`].
    async fn send_text(&self, target: &ReplyTarget, text: &str) -> Result<(), ChannelError>;

    /// Show a transient "working on it" indicator.
    async fn send_typing(&self, target: &ReplyTarget) -> Result<(), ChannelError>;

    /// Longest deliverable message, in the transport's own text units.
    fn max_message_len(&self) -> usize;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
