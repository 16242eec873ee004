//! "Still working" signal shown while an agent call is in flight.
//!
//! One spawned loop per call: it fires immediately, then every interval, until
//! the done signal arrives. Dropping the [`PresenceSignal`] sends that signal,
//! so every exit path of the caller stops the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::channels::{Channel, ReplyTarget};

/// Something that can show a "working" indicator to the user.
#[async_trait]
pub trait PresenceNotifier: Send + Sync {
    async fn notify_working(&self);
}

/// Typing indicator in a chat thread.
pub struct ChannelPresence {
    channel: Arc<dyn Channel>,
    target: ReplyTarget,
}

impl ChannelPresence {
    pub fn new(channel: Arc<dyn Channel>, target: ReplyTarget) -> Self {
        Self { channel, target }
    }
}

#[async_trait]
impl PresenceNotifier for ChannelPresence {
    async fn notify_working(&self) {
        if let Err(e) = self.channel.send_typing(&self.target).await {
            debug!(chat_id = %self.target.chat_id, error = %e, "Typing indicator failed");
        }
    }
}

/// Handle to a running presence loop.
pub struct PresenceSignal {
    done: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PresenceSignal {
    /// Start signalling through `notifier` every `every`.
    pub fn start(notifier: Arc<dyn PresenceNotifier>, every: Duration) -> Self {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes at once; it is always signalled.
            ticker.tick().await;
            notifier.notify_working().await;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut done_rx => break,
                    _ = ticker.tick() => notifier.notify_working().await,
                }
            }
        });

        Self {
            done: Some(done_tx),
            handle: Some(handle),
        }
    }

    /// Send the done signal without waiting for the loop to exit.
    pub fn stop(mut self) {
        self.signal_done();
    }

    /// Send the done signal and wait until no further signal can fire.
    pub async fn stop_and_wait(mut self) {
        self.signal_done();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    fn signal_done(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl Drop for PresenceSignal {
    fn drop(&mut self) {
        self.signal_done();
    }
}
