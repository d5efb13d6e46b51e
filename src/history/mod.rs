//! Per-user chat history.
//!
//! Conversations are stored server-side, keyed by user id, as one JSON array
//! of [`ChatMessage`]s per user.
//!
//! - [`MemoryHistoryStore`]: process memory, lost on restart
//! - [`FileHistoryStore`]: one `banorte_chat_history_<user>.json` file per user

mod file;

pub use file::FileHistoryStore;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm::{Turn, TurnRole};

/// Key prefix shared by every stored conversation.
pub const HISTORY_PREFIX: &str = "banorte_chat_history_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_json: Option<Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            raw_json: None,
        }
    }

    pub fn assistant(content: impl Into<String>, raw_json: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            raw_json,
        }
    }

    pub fn to_turn(&self) -> Turn {
        let role = match self.sender {
            Sender::User => TurnRole::User,
            Sender::Assistant => TurnRole::Model,
        };
        Turn::new(role, self.content.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history document is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync + std::fmt::Debug {
    /// Replace the stored conversation.
    async fn save(&self, user_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError>;

    /// Stored conversation, or an empty list.
    async fn load(&self, user_id: &str) -> Result<Vec<ChatMessage>, HistoryError>;

    async fn clear(&self, user_id: &str) -> Result<(), HistoryError>;

    async fn clear_all(&self) -> Result<(), HistoryError>;

    /// Size of the stored document in KiB, two decimals.
    async fn size_kb(&self, user_id: &str) -> Result<f64, HistoryError>;

    /// Append messages, keeping at most `max_messages` of the newest.
    ///
    /// Stores shared between requests override this so the read and the
    /// write happen under one lock.
    async fn append(
        &self,
        user_id: &str,
        new: &[ChatMessage],
        max_messages: usize,
    ) -> Result<(), HistoryError> {
        let mut messages = self.load(user_id).await?;
        messages.extend_from_slice(new);
        let skip = messages.len().saturating_sub(max_messages);
        self.save(user_id, &messages[skip..]).await
    }
}

pub(crate) fn kib(bytes: usize) -> f64 {
    (bytes as f64 / 1024.0 * 100.0).round() / 100.0
}

/// In-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, user_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError> {
        self.inner
            .write()
            .await
            .insert(user_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        Ok(self
            .inner
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &str) -> Result<(), HistoryError> {
        self.inner.write().await.remove(user_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), HistoryError> {
        self.inner.write().await.clear();
        Ok(())
    }

    async fn size_kb(&self, user_id: &str) -> Result<f64, HistoryError> {
        let guard = self.inner.read().await;
        match guard.get(user_id) {
            Some(messages) => Ok(kib(serde_json::to_vec(messages)?.len())),
            None => Ok(0.0),
        }
    }

    async fn append(
        &self,
        user_id: &str,
        new: &[ChatMessage],
        max_messages: usize,
    ) -> Result<(), HistoryError> {
        let mut guard = self.inner.write().await;
        let messages = guard.entry(user_id.to_string()).or_default();
        messages.extend_from_slice(new);
        let skip = messages.len().saturating_sub(max_messages);
        messages.drain(..skip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_user_is_empty() {
        let store = MemoryHistoryStore::new();
        assert!(store.load("E001").await.unwrap().is_empty());
        assert!(store.size_kb("E001").await.unwrap().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_append_keeps_newest() {
        let store = MemoryHistoryStore::new();
        let batch: Vec<_> = (0..5).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        store.append("7", &batch, 3).await.unwrap();
        store
            .append("7", &[ChatMessage::assistant("fin", None)], 3)
            .await
            .unwrap();

        let loaded = store.load("7").await.unwrap();
        let contents: Vec<_> = loaded.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4", "fin"]);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = MemoryHistoryStore::new();
        store.save("1", &[ChatMessage::user("a")]).await.unwrap();
        store.save("2", &[ChatMessage::user("b")]).await.unwrap();
        store.clear("1").await.unwrap();
        assert!(store.load("1").await.unwrap().is_empty());
        assert_eq!(store.load("2").await.unwrap().len(), 1);
        store.clear_all().await.unwrap();
        assert!(store.load("2").await.unwrap().is_empty());
    }

    #[test]
    fn test_wire_format() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"id":"1","content":"hola","sender":"assistant","timestamp":"2024-05-01T10:00:00.000Z","rawJson":{"a":1}}"#,
        )
        .unwrap();
        assert_eq!(msg.sender, Sender::Assistant);
        assert_eq!(msg.to_turn().role, TurnRole::Model);
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["rawJson"]["a"], 1);
        assert_eq!(kib(2048), 2.0);
    }
}
