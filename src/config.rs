//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Agent URL used when neither `AGENT_URL` nor `EVE_URL` is set.
pub const DEFAULT_AGENT_URL: &str = "http://localhost:3000";

/// Process configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// The only Telegram user the bot serves.
    pub allowed_user_id: i64,
    /// Base URL of the agent HTTP API.
    pub agent_url: Url,
    /// Override for the mappings file location.
    pub mappings_path: Option<PathBuf>,
}

impl RelayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = non_empty("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let allowed_user_id = non_empty("TELEGRAM_ALLOWED_USER_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_ALLOWED_USER_ID".into()))?
            .trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "TELEGRAM_ALLOWED_USER_ID".into(),
                message: format!("must be a number: {e}"),
            })?;

        let (url_key, raw_url) = match non_empty("AGENT_URL") {
            Some(url) => ("AGENT_URL", url),
            None => match non_empty("EVE_URL") {
                Some(url) => ("EVE_URL", url),
                None => ("AGENT_URL", DEFAULT_AGENT_URL.to_string()),
            },
        };
        let agent_url = parse_base_url(url_key, raw_url.trim())?;

        let mappings_path = non_empty("RELAY_MAPPINGS_PATH").map(PathBuf::from);

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            allowed_user_id,
            agent_url,
            mappings_path,
        })
    }
}

fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw} is not an http(s) base URL"),
        });
    }
    Ok(url)
}

/// Fixed relay tunables.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// How often the "still working" indicator is re-sent during an agent call.
    pub presence_interval: Duration,
    /// Pause between consecutive chunks of one response.
    pub chunk_pause: Duration,
    /// Agent HTTP timeout; longer than the agent's own 5 minute limit.
    pub agent_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_secs(5),
            chunk_pause: Duration::from_millis(100),
            agent_timeout: Duration::from_secs(6 * 60),
        }
    }
}
