//! Mapping store: chat → project binding and per-thread agent sessions.
//!
//! The whole map lives in memory and is rewritten to a single JSON file on
//! every mutation. One lock covers both the in-memory update and the file
//! write, so writes from concurrent chats are serialized. Reads hand out
//! owned copies.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

/// Thread key used for messages that carry no thread identifier.
pub const DEFAULT_THREAD: &str = "default";

/// The agent session backing one chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSession {
    #[serde(rename = "eveSessionId")]
    pub agent_session_id: String,
    #[serde(rename = "lastActive")]
    pub last_active: DateTime<Utc>,
}

/// A chat's link to an agent project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBinding {
    pub project_id: String,
    pub project_name: String,
    /// Thread key → session.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sessions: BTreeMap<String, ThreadSession>,
}

/// On-disk layout of the mappings file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingsData {
    #[serde(default, deserialize_with = "null_as_default")]
    chat_mappings: BTreeMap<String, ChatBinding>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// File-backed store of chat bindings.
pub struct MappingStore {
    path: PathBuf,
    data: Mutex<MappingsData>,
}

impl MappingStore {
    /// `~/.config/relay/telegram-mappings.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoHomeDir)?;
        Ok(home
            .join(".config")
            .join("relay")
            .join("telegram-mappings.json"))
    }

    /// Load the store from `path`. A missing file yields an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data: MappingsData = match fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No mappings file yet, starting empty");
                MappingsData::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            chats = data.chat_mappings.len(),
            "Mappings loaded"
        );

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Link a chat to a project, replacing any previous binding and its sessions.
    pub async fn bind(
        &self,
        chat_id: &str,
        project_id: &str,
        project_name: &str,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.chat_mappings.insert(
            chat_id.to_string(),
            ChatBinding {
                project_id: project_id.to_string(),
                project_name: project_name.to_string(),
                sessions: BTreeMap::new(),
            },
        );
        self.save(&data).await
    }

    /// Remove a chat's binding. Unbound chats are not an error.
    pub async fn unbind(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.chat_mappings.remove(chat_id);
        self.save(&data).await
    }

    pub async fn get_binding(&self, chat_id: &str) -> Option<ChatBinding> {
        self.data.lock().await.chat_mappings.get(chat_id).cloned()
    }

    pub async fn get_session(&self, chat_id: &str, thread_id: &str) -> Option<ThreadSession> {
        self.data
            .lock()
            .await
            .chat_mappings
            .get(chat_id)
            .and_then(|binding| binding.sessions.get(thread_id))
            .cloned()
    }

    /// Record (or refresh) the session for a thread, stamping it with the
    /// current time. Does nothing for an unbound chat.
    pub async fn set_session(
        &self,
        chat_id: &str,
        thread_id: &str,
        agent_session_id: &str,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let Some(binding) = data.chat_mappings.get_mut(chat_id) else {
            return Ok(());
        };
        binding.sessions.insert(
            thread_id.to_string(),
            ThreadSession {
                agent_session_id: agent_session_id.to_string(),
                last_active: Utc::now(),
            },
        );
        self.save(&data).await
    }

    /// Record a freshly created session, but only while the chat is still
    /// bound to `project_id`. Returns whether the session was stored.
    pub async fn attach_session(
        &self,
        chat_id: &str,
        project_id: &str,
        thread_id: &str,
        agent_session_id: &str,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let Some(binding) = data
            .chat_mappings
            .get_mut(chat_id)
            .filter(|b| b.project_id == project_id)
        else {
            return Ok(false);
        };
        binding.sessions.insert(
            thread_id.to_string(),
            ThreadSession {
                agent_session_id: agent_session_id.to_string(),
                last_active: Utc::now(),
            },
        );
        self.save(&data).await?;
        Ok(true)
    }

    /// Stamp the thread's session with the current time if it is still
    /// `agent_session_id`. A cleared or replaced session is left alone.
    /// Returns whether anything was updated.
    pub async fn touch_session(
        &self,
        chat_id: &str,
        thread_id: &str,
        agent_session_id: &str,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let Some(session) = data
            .chat_mappings
            .get_mut(chat_id)
            .and_then(|b| b.sessions.get_mut(thread_id))
            .filter(|s| s.agent_session_id == agent_session_id)
        else {
            return Ok(false);
        };
        session.last_active = Utc::now();
        self.save(&data).await?;
        Ok(true)
    }

    /// Forget a thread's session, keeping the binding. Does nothing for an
    /// unbound chat.
    pub async fn clear_session(&self, chat_id: &str, thread_id: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let Some(binding) = data.chat_mappings.get_mut(chat_id) else {
            return Ok(());
        };
        binding.sessions.remove(thread_id);
        self.save(&data).await
    }

    /// Write the full map. Callers hold the data lock.
    async fn save(&self, data: &MappingsData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_vec_pretty(data)?;
        let tmp = temp_path(&self.path);
        fs::write(&tmp, &raw).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            chats = data.chat_mappings.len(),
            "Mappings saved"
        );
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
