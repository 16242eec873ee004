//! Scriptable in-memory agent for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{AgentBackend, CreatedSession, MessageReply, Project};
use crate::error::AgentError;

/// Hands out session ids `s1`, `s2`, ... and echoes messages unless a reply
/// has been queued with [`StubAgent::push_reply`].
pub(crate) struct StubAgent {
    projects: Mutex<Result<Vec<Project>, AgentError>>,
    created: Mutex<Vec<(String, Option<String>)>>,
    sent: Mutex<Vec<(String, String)>>,
    replies: Mutex<VecDeque<Result<MessageReply, AgentError>>>,
    create_error: Mutex<Option<AgentError>>,
    delay: Duration,
}

impl StubAgent {
    pub(crate) fn new(projects: Vec<Project>) -> Self {
        Self {
            projects: Mutex::new(Ok(projects)),
            created: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            create_error: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    /// Every create and send waits this long before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fail_projects(&self, err: AgentError) {
        *self.projects.lock().unwrap() = Err(err);
    }

    pub(crate) fn fail_create(&self, err: AgentError) {
        *self.create_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn push_reply(&self, reply: Result<&str, AgentError>) {
        let reply = reply.map(|text| MessageReply {
            response: text.to_string(),
            stats: Value::Null,
        });
        self.replies.lock().unwrap().push_back(reply);
    }

    /// `(project_id, name)` of every created session, in order.
    pub(crate) fn created(&self) -> Vec<(String, Option<String>)> {
        self.created.lock().unwrap().clone()
    }

    /// `(session_id, text)` of every message sent, in order.
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

pub(crate) fn project(id: &str, name: &str, disabled: bool) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
        path: format!("/work/{id}"),
        model: "sonnet".to_string(),
        disabled,
    }
}

#[async_trait]
impl AgentBackend for StubAgent {
    async fn list_projects(&self) -> Result<Vec<Project>, AgentError> {
        self.projects.lock().unwrap().clone()
    }

    async fn create_session(
        &self,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<CreatedSession, AgentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut created = self.created.lock().unwrap();
        created.push((project_id.to_string(), name.map(String::from)));
        Ok(CreatedSession {
            session_id: format!("s{}", created.len()),
            project_id: project_id.to_string(),
            model: "sonnet".to_string(),
        })
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageReply, AgentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));

        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(MessageReply {
                response: format!("echo: {text}"),
                stats: Value::Null,
            }),
        }
    }
}
