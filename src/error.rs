//! Error types for the relay.
//!
//! The `Display` output of [`RelayError`] is what the chat user sees, so the
//! wording of those variants is part of the bot's behavior.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mapping store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Errors from the agent HTTP API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("failed to reach agent: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("session is busy processing another message")]
    Busy,

    #[error("response timed out")]
    Timeout,

    /// Non-success status. `message` is the backend's own text when it sent one.
    #[error("{message}")]
    Backend {
        status: u16,
        message: String,
        code: Option<String>,
    },
}

/// Structured code an agent may send when a session id is unknown to it.
pub const SESSION_NOT_FOUND_CODE: &str = "session_not_found";

impl AgentError {
    /// Whether the agent no longer knows the session (expired or recycled).
    ///
    /// Structured signals win; the "not found" text match only covers agents
    /// that send neither a code nor a 404.
    pub fn is_session_not_found(&self) -> bool {
        match self {
            Self::Backend {
                status,
                message,
                code,
            } => {
                if let Some(code) = code {
                    return code == SESSION_NOT_FOUND_CODE;
                }
                *status == 404 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

/// Relay protocol errors, rendered verbatim to the chat user.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("This chat is not linked to a project. Use /link <projectName>")]
    NotLinked,

    #[error("No project found matching {query:?}")]
    NoProjectMatch { query: String },

    #[error("Multiple matches:\n{}\n\nBe more specific.", format_candidates(.candidates))]
    AmbiguousProject {
        query: String,
        candidates: Vec<String>,
    },

    #[error("Session expired. Send your message again to start a new conversation.")]
    SessionExpired,

    #[error("Failed to create session: {0}")]
    SessionCreate(AgentError),

    #[error("Failed to reach Eve: {0}")]
    ProjectLookup(AgentError),

    #[error("Error: {0}")]
    Agent(#[from] AgentError),

    #[error("Failed to save mapping: {0}")]
    Persist(#[from] StoreError),
}

fn format_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .map(|name| format!("  {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16, message: &str, code: Option<&str>) -> AgentError {
        AgentError::Backend {
            status,
            message: message.to_string(),
            code: code.map(String::from),
        }
    }

    #[test]
    fn structured_code_detects_expiry() {
        assert!(backend(400, "gone", Some(SESSION_NOT_FOUND_CODE)).is_session_not_found());
    }

    #[test]
    fn unrelated_code_wins_over_text() {
        assert!(!backend(500, "project not found", Some("internal")).is_session_not_found());
    }

    #[test]
    fn status_404_detects_expiry() {
        assert!(backend(404, "agent returned 404", None).is_session_not_found());
    }

    #[test]
    fn text_fallback_is_case_insensitive() {
        assert!(backend(500, "Session Not Found", None).is_session_not_found());
        assert!(!backend(500, "model overloaded", None).is_session_not_found());
    }

    #[test]
    fn transport_errors_are_never_expiry() {
        assert!(!AgentError::Network("not found".into()).is_session_not_found());
        assert!(!AgentError::Busy.is_session_not_found());
        assert!(!AgentError::Timeout.is_session_not_found());
    }

    #[test]
    fn backend_error_displays_message_verbatim() {
        let err = RelayError::Agent(backend(500, "model overloaded", None));
        assert_eq!(err.to_string(), "Error: model overloaded");
    }

    #[test]
    fn ambiguous_lists_every_candidate() {
        let err = RelayError::AmbiguousProject {
            query: "pro".into(),
            candidates: vec!["Proj A".into(), "Project B".into()],
        };
        assert_eq!(
            err.to_string(),
            "Multiple matches:\n  Proj A\n  Project B\n\nBe more specific."
        );
    }

    #[test]
    fn no_match_quotes_query() {
        let err = RelayError::NoProjectMatch { query: "zzz".into() };
        assert_eq!(err.to_string(), "No project found matching \"zzz\"");
    }
}
