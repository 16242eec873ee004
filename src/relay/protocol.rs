//! Relay protocol: chat/thread state transitions around agent calls.
//!
//! Per (chat, thread) a conversation is Unbound, Bound without a session, or
//! Bound with an active session. Only this module moves between those states.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agent::{AgentBackend, Project};
use crate::channels::split_message;
use crate::config::RelaySettings;
use crate::error::RelayError;
use crate::relay::presence::{PresenceNotifier, PresenceSignal};
use crate::store::{ChatBinding, DEFAULT_THREAD, MappingStore};

/// Read-only summary of a chat's binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStatus {
    pub project_id: String,
    pub project_name: String,
    pub session_count: usize,
}

/// Relays chat messages to the agent and keeps the mapping store current.
pub struct Relay {
    store: Arc<MappingStore>,
    agent: Arc<dyn AgentBackend>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        store: Arc<MappingStore>,
        agent: Arc<dyn AgentBackend>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            agent,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Whether the agent answers at all.
    pub async fn health_check(&self) -> Result<(), RelayError> {
        self.list_projects().await.map(|_| ())
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, RelayError> {
        self.agent
            .list_projects()
            .await
            .map_err(RelayError::ProjectLookup)
    }

    /// Bind `chat_id` to the project matching `query`. Any previous binding
    /// and its sessions are replaced.
    pub async fn link(&self, chat_id: &str, query: &str) -> Result<Project, RelayError> {
        let projects = self.list_projects().await?;
        let project = resolve_project(&projects, query)?.clone();

        self.store
            .bind(chat_id, &project.id, &project.name)
            .await?;

        info!(chat_id, project = %project.name, "Chat linked");
        Ok(project)
    }

    /// Remove the chat's binding and return what it was.
    pub async fn unlink(&self, chat_id: &str) -> Result<ChatBinding, RelayError> {
        let binding = self
            .store
            .get_binding(chat_id)
            .await
            .ok_or(RelayError::NotLinked)?;

        self.store.unbind(chat_id).await?;

        info!(chat_id, project = %binding.project_name, "Chat unlinked");
        Ok(binding)
    }

    pub async fn status(&self, chat_id: &str) -> Result<ChatStatus, RelayError> {
        let binding = self
            .store
            .get_binding(chat_id)
            .await
            .ok_or(RelayError::NotLinked)?;

        Ok(ChatStatus {
            project_id: binding.project_id,
            project_name: binding.project_name,
            session_count: binding.sessions.len(),
        })
    }

    /// Drop the thread's session so the next message starts a new one.
    pub async fn clear_session(&self, chat_id: &str, thread_id: &str) -> Result<(), RelayError> {
        self.store.clear_session(chat_id, thread_id).await?;
        debug!(chat_id, thread_id, "Session cleared");
        Ok(())
    }

    /// Send `text` to the thread's agent session and return the reply split
    /// into chunks of at most `max_units` (the channel's message limit).
    ///
    /// Creates the session on first use. `presence` is signalled for as long
    /// as the agent call is in flight. A session the agent no longer knows is
    /// forgotten and reported as [`RelayError::SessionExpired`]; the message is
    /// not retried.
    pub async fn relay_message(
        &self,
        chat_id: &str,
        thread_id: &str,
        text: &str,
        presence: Arc<dyn PresenceNotifier>,
        max_units: usize,
    ) -> Result<Vec<String>, RelayError> {
        let binding = self
            .store
            .get_binding(chat_id)
            .await
            .ok_or(RelayError::NotLinked)?;

        let session_id = self.ensure_session(chat_id, thread_id, &binding).await?;

        let signal = PresenceSignal::start(presence, self.settings.presence_interval);
        let result = self.agent.send_message(&session_id, text).await;
        signal.stop();

        match result {
            Ok(reply) => {
                match self
                    .store
                    .touch_session(chat_id, thread_id, &session_id)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(chat_id, thread_id, "Session changed during the call; not refreshed")
                    }
                    Err(e) => {
                        warn!(chat_id, thread_id, error = %e, "Failed to refresh session activity")
                    }
                }
                debug!(
                    chat_id,
                    thread_id,
                    session_id = %session_id,
                    chars = reply.response.chars().count(),
                    "Agent replied"
                );
                Ok(split_message(&reply.response, max_units))
            }
            Err(e) if e.is_session_not_found() => {
                info!(chat_id, thread_id, session_id = %session_id, "Agent session expired");
                if let Err(e) = self.store.clear_session(chat_id, thread_id).await {
                    warn!(chat_id, thread_id, error = %e, "Failed to persist expired session");
                }
                Err(RelayError::SessionExpired)
            }
            Err(e) => {
                warn!(chat_id, thread_id, session_id = %session_id, error = %e, "Agent call failed");
                Err(RelayError::Agent(e))
            }
        }
    }

    /// Send `text` through the thread's existing session, if any. Never
    /// creates a session; failures are logged and yield `None`.
    pub async fn forward_if_active(
        &self,
        chat_id: &str,
        thread_id: &str,
        text: &str,
    ) -> Option<String> {
        let session = self.store.get_session(chat_id, thread_id).await?;

        match self.agent.send_message(&session.agent_session_id, text).await {
            Ok(reply) if !reply.response.is_empty() => Some(reply.response),
            Ok(_) => None,
            Err(e) => {
                debug!(chat_id, thread_id, error = %e, "Forward to active session failed");
                None
            }
        }
    }

    /// Existing session id for the thread, or a freshly created one.
    async fn ensure_session(
        &self,
        chat_id: &str,
        thread_id: &str,
        binding: &ChatBinding,
    ) -> Result<String, RelayError> {
        if let Some(session) = binding.sessions.get(thread_id) {
            return Ok(session.agent_session_id.clone());
        }

        let name = session_name(thread_id);
        let created = self
            .agent
            .create_session(&binding.project_id, name.as_deref())
            .await
            .map_err(RelayError::SessionCreate)?;

        info!(
            chat_id,
            thread_id,
            session_id = %created.session_id,
            project = %binding.project_name,
            "Agent session created"
        );

        match self
            .store
            .attach_session(chat_id, &binding.project_id, thread_id, &created.session_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(chat_id, thread_id, "Chat was relinked while creating a session; not recorded")
            }
            Err(e) => warn!(chat_id, thread_id, error = %e, "Failed to persist new session"),
        }

        Ok(created.session_id)
    }
}

/// Display name for a thread's agent session. The default thread gets none.
pub fn session_name(thread_id: &str) -> Option<String> {
    (thread_id != DEFAULT_THREAD).then(|| format!("Telegram thread {thread_id}"))
}

/// Pick the enabled project `query` names: a case-insensitive exact match
/// first, then a unique case-insensitive substring match.
pub fn resolve_project<'a>(projects: &'a [Project], query: &str) -> Result<&'a Project, RelayError> {
    let needle = query.to_lowercase();
    let enabled = || projects.iter().filter(|p| !p.disabled);

    if let Some(exact) = enabled().find(|p| p.name.to_lowercase() == needle) {
        return Ok(exact);
    }

    let matches: Vec<&Project> = enabled()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .collect();

    match matches.as_slice() {
        [] => Err(RelayError::NoProjectMatch {
            query: query.to_string(),
        }),
        [only] => Ok(*only),
        many => Err(RelayError::AmbiguousProject {
            query: query.to_string(),
            candidates: many.iter().map(|p| p.name.clone()).collect(),
        }),
    }
}
