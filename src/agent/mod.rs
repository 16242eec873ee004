//! Agent backend, the conversational service chat messages are relayed to.
//!
//! [`AgentBackend`] is the seam the relay talks through; [`AgentClient`] is
//! the HTTP implementation.

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::AgentClient;
pub use types::{CreatedSession, MessageReply, Project};

use async_trait::async_trait;

use crate::error::AgentError;

/// The three agent operations the relay needs.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// All projects known to the agent, disabled ones included.
    async fn list_projects(&self) -> Result<Vec<Project>, AgentError>;

    /// Open a new session in a project. `name` is a display label.
    async fn create_session(
        &self,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<CreatedSession, AgentError>;

    /// Send one message and wait for the complete reply.
    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageReply, AgentError>;
}
