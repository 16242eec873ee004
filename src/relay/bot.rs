//! Chat-facing dispatcher: single-user gate, bot commands, and relaying
//! everything else to the agent.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::agent::Project;
use crate::channels::{Channel, IncomingMessage, deliver, split_message};
use crate::error::{RelayError, Result};
use crate::relay::command::{Command, HELP_TEXT};
use crate::relay::presence::ChannelPresence;
use crate::relay::protocol::Relay;

/// Sent in place of an empty agent reply, which the chat API would reject.
pub const EMPTY_RESPONSE: &str = "(empty response)";

pub struct Bot {
    relay: Arc<Relay>,
    channel: Arc<dyn Channel>,
    allowed_user_id: i64,
}

impl Bot {
    pub fn new(relay: Arc<Relay>, channel: Arc<dyn Channel>, allowed_user_id: i64) -> Self {
        Self {
            relay,
            channel,
            allowed_user_id,
        }
    }

    /// Receive messages until Ctrl+C, SIGTERM, or the end of the channel's
    /// stream. Each message is handled on its own task.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut messages = self.channel.start().await?;
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        info!(channel = self.channel.name(), "Relay bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        info!("Message stream ended, shutting down...");
                        break;
                    }
                }
            };

            let bot = Arc::clone(&self);
            tokio::spawn(async move {
                bot.handle_message(&message).await;
            });
        }

        self.channel.shutdown().await?;
        Ok(())
    }

    pub async fn handle_message(&self, message: &IncomingMessage) {
        let command = Command::parse(&message.text);

        if !self.is_allowed(message) {
            warn!(
                sender_id = ?message.sender_id,
                username = ?message.username,
                chat_id = %message.chat_id,
                "Ignoring message from unauthorized user"
            );
            if command == Command::Start {
                self.reply(message, "New phone, who dis?").await;
            }
            return;
        }

        debug!(
            chat_id = %message.chat_id,
            thread_id = message.thread_key(),
            command = ?command,
            "Handling message"
        );

        let chat_id = message.chat_id.as_str();
        let thread_id = message.thread_key();

        match command {
            Command::Start => {
                let text = match self.relay.health_check().await {
                    Ok(()) => "Online. Eve is connected.",
                    Err(e) => {
                        warn!(error = %e, "Agent health check failed");
                        "Online, but Eve is unreachable."
                    }
                };
                self.reply(message, text).await;
            }
            Command::Help => {
                self.reply(message, HELP_TEXT).await;
                if let Some(answer) = self
                    .relay
                    .forward_if_active(chat_id, thread_id, "/help")
                    .await
                {
                    self.reply(message, &answer).await;
                }
            }
            Command::Link { query } => {
                let text = if query.is_empty() {
                    "Usage: /link <projectName>".to_string()
                } else {
                    match self.relay.link(chat_id, &query).await {
                        Ok(project) => format!("Linked to project: {}", project.name),
                        Err(e) => e.to_string(),
                    }
                };
                self.reply(message, &text).await;
            }
            Command::Unlink => {
                let text = match self.relay.unlink(chat_id).await {
                    Ok(binding) => format!("Unlinked from project: {}", binding.project_name),
                    Err(RelayError::NotLinked) => {
                        "This chat is not linked to any project.".to_string()
                    }
                    Err(RelayError::Persist(e)) => format!("Failed to unlink: {e}"),
                    Err(e) => e.to_string(),
                };
                self.reply(message, &text).await;
            }
            Command::Projects => {
                let text = match self.relay.list_projects().await {
                    Ok(projects) => format_projects(&projects),
                    Err(e) => e.to_string(),
                };
                self.reply(message, &text).await;
            }
            Command::Status => {
                let text = match self.relay.status(chat_id).await {
                    Ok(status) => format!(
                        "Project: {}\nSessions: {}",
                        status.project_name, status.session_count
                    ),
                    Err(RelayError::NotLinked) => {
                        "This chat is not linked. Use /link <projectName>".to_string()
                    }
                    Err(e) => e.to_string(),
                };
                self.reply(message, &text).await;
            }
            Command::Clear => {
                let text = match self.relay.clear_session(chat_id, thread_id).await {
                    Ok(()) => {
                        "Session cleared. Next message will start a new conversation.".to_string()
                    }
                    Err(RelayError::Persist(e)) => format!("Failed to clear session: {e}"),
                    Err(e) => e.to_string(),
                };
                self.reply(message, &text).await;
            }
            Command::Relay { text } => self.relay_text(message, &text).await,
        }
    }

    fn is_allowed(&self, message: &IncomingMessage) -> bool {
        message.sender_id == Some(self.allowed_user_id)
    }

    async fn relay_text(&self, message: &IncomingMessage, text: &str) {
        let presence = Arc::new(ChannelPresence::new(
            Arc::clone(&self.channel),
            message.reply_target(),
        ));

        let chunks = match self
            .relay
            .relay_message(
                &message.chat_id,
                message.thread_key(),
                text,
                presence,
                self.channel.max_message_len(),
            )
            .await
        {
            Ok(chunks) if chunks.iter().all(|c| c.trim().is_empty()) => {
                vec![EMPTY_RESPONSE.to_string()]
            }
            Ok(chunks) => chunks,
            Err(e) => vec![e.to_string()],
        };

        self.send_chunks(message, &chunks).await;
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) {
        let chunks = split_message(text, self.channel.max_message_len());
        self.send_chunks(message, &chunks).await;
    }

    async fn send_chunks(&self, message: &IncomingMessage, chunks: &[String]) {
        let pause = self.relay.settings().chunk_pause;
        if let Err(e) = deliver(self.channel.as_ref(), &message.reply_target(), chunks, pause).await
        {
            warn!(chat_id = %message.chat_id, error = %e, "Failed to deliver reply");
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down..."),
        _ = terminate => info!("SIGTERM received, shutting down..."),
    }
}

/// `/projects` listing, disabled projects marked.
pub fn format_projects(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }

    let lines: Vec<String> = projects
        .iter()
        .map(|p| {
            let status = if p.disabled { " (disabled)" } else { "" };
            format!("  {} [{}]{}", p.name, p.model, status)
        })
        .collect();

    format!("Projects:\n{}", lines.join("\n"))
}
