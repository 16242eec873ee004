//! In-memory channel for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::channels::{Channel, MessageStream, ReplyTarget};
use crate::error::ChannelError;

/// Records everything sent through it; optionally fails after N sends.
pub(crate) struct RecordingChannel {
    sent: Mutex<Vec<(ReplyTarget, String)>>,
    typing: AtomicUsize,
    fail_after: Option<usize>,
    idle: bool,
}

impl RecordingChannel {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            typing: AtomicUsize::new(0),
            fail_after: None,
            idle: false,
        }
    }

    /// `start` yields a stream that never produces or ends.
    pub(crate) fn idle() -> Self {
        Self {
            idle: true,
            ..Self::new()
        }
    }

    pub(crate) fn failing_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    pub(crate) fn sent(&self) -> Vec<(ReplyTarget, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }

    pub(crate) fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        if self.idle {
            Ok(Box::pin(futures::stream::pending()))
        } else {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    async fn send_text(&self, target: &ReplyTarget, text: &str) -> Result<(), ChannelError> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "injected failure".into(),
            });
        }
        sent.push((target.clone(), text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, _target: &ReplyTarget) -> Result<(), ChannelError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        4096
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
