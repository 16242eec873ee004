//! HTTP client for the agent API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::agent::AgentBackend;
use crate::agent::types::{
    CreateSessionRequest, CreatedSession, MessageReply, Project, SendMessageBody,
    SendMessageRequest,
};
use crate::error::AgentError;

/// Stateless wrapper over the agent's REST endpoints.
pub struct AgentClient {
    base_url: Url,
    client: reqwest::Client,
}

impl AgentClient {
    /// Build a client for `base_url`. `timeout` bounds each whole request and
    /// should exceed the agent's own processing timeout.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl AgentBackend for AgentClient {
    async fn list_projects(&self) -> Result<Vec<Project>, AgentError> {
        let resp = self
            .client
            .get(self.endpoint(&["api", "projects"]))
            .send()
            .await
            .map_err(network)?;

        let projects: Vec<Project> = decode_success(resp).await?;
        debug!(count = projects.len(), "Fetched agent projects");
        Ok(projects)
    }

    async fn create_session(
        &self,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<CreatedSession, AgentError> {
        let body = CreateSessionRequest {
            project_id,
            name: name.filter(|n| !n.is_empty()),
        };
        let resp = self
            .client
            .post(self.endpoint(&["api", "sessions"]))
            .json(&body)
            .send()
            .await
            .map_err(network)?;

        let created: CreatedSession = decode_success(resp).await?;
        debug!(
            project_id,
            session_id = %created.session_id,
            model = %created.model,
            "Agent session created"
        );
        Ok(created)
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageReply, AgentError> {
        debug!(session_id, chars = text.chars().count(), "Sending message to agent");

        let resp = self
            .client
            .post(self.endpoint(&["api", "sessions", session_id, "message"]))
            .json(&SendMessageRequest { text })
            .send()
            .await
            .map_err(network)?;

        let status = resp.status();
        let raw = resp
            .bytes()
            .await
            .map_err(|e| AgentError::Network(format!("failed to read response: {e}")))?;

        match status {
            StatusCode::CONFLICT => return Err(AgentError::Busy),
            StatusCode::GATEWAY_TIMEOUT => return Err(AgentError::Timeout),
            _ => {}
        }

        if status.is_success() {
            let body: SendMessageBody =
                serde_json::from_slice(&raw).map_err(|e| AgentError::Decode(e.to_string()))?;
            return Ok(MessageReply {
                response: body.response,
                stats: body.stats,
            });
        }

        // Error bodies are best effort; fall back to a generic message.
        let body: SendMessageBody = serde_json::from_slice(&raw).unwrap_or_default();
        let message = body
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("agent returned {}", status.as_u16()));

        Err(AgentError::Backend {
            status: status.as_u16(),
            message,
            code: body.code,
        })
    }
}

fn network(e: reqwest::Error) -> AgentError {
    AgentError::Network(e.to_string())
}

/// Decode a 2xx JSON body, or turn any other status into `Backend`.
async fn decode_success<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AgentError> {
    let status = resp.status();
    let raw = resp
        .bytes()
        .await
        .map_err(|e| AgentError::Network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&raw);
        return Err(AgentError::Backend {
            status: status.as_u16(),
            message: format!("agent returned {}: {}", status.as_u16(), body.trim()),
            code: None,
        });
    }

    serde_json::from_slice(&raw).map_err(|e| AgentError::Decode(e.to_string()))
}
