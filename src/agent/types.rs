//! Wire types for the agent HTTP API.

use serde::{Deserialize, Serialize};

/// A project the agent can open sessions in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionRequest<'a> {
    pub project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

/// Result of `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub text: &'a str,
}

/// Body of `POST /api/sessions/{id}/message`, success or failure.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendMessageBody {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub stats: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// A completed agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageReply {
    pub response: String,
    /// Opaque usage statistics, passed through untouched.
    pub stats: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_tolerates_missing_optional_fields() {
        let project: Project = serde_json::from_str(r#"{"id":"p1","name":"Proj"}"#).unwrap();
        assert_eq!(project.model, "");
        assert!(!project.disabled);
    }

    #[test]
    fn create_request_omits_absent_name() {
        let body = serde_json::to_value(CreateSessionRequest {
            project_id: "p1",
            name: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"projectId": "p1"}));

        let body = serde_json::to_value(CreateSessionRequest {
            project_id: "p1",
            name: Some("Telegram thread 5"),
        })
        .unwrap();
        assert_eq!(body["name"], "Telegram thread 5");
    }

    #[test]
    fn message_body_reads_error_and_code() {
        let body: SendMessageBody =
            serde_json::from_str(r#"{"error":"Session not found","code":"session_not_found"}"#)
                .unwrap();
        assert_eq!(body.error.as_deref(), Some("Session not found"));
        assert_eq!(body.code.as_deref(), Some("session_not_found"));
        assert!(body.response.is_empty());
    }
}
