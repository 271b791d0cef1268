//! Per-sender conversation history.
//!
//! History is an append-only, ordered list of user/assistant turns keyed by sender id.
//! The Redis store keeps one list per sender, newest first, with records of the form
//! `{"type": "human" | "ai", "data": {"content": ...}}` so existing conversations stay readable.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "human")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history store error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("history record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Ordered message log per sender.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All turns for `id` in arrival order. Unknown ids yield an empty history.
    async fn load(&self, id: &str) -> Result<Vec<HistoryMessage>, HistoryError>;

    /// Append turns to the end of `id`'s history, creating it if needed.
    async fn append(&self, id: &str, messages: &[HistoryMessage]) -> Result<(), HistoryError>;
}

/// In-process history (used when no store URL is configured, and in tests).
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<HistoryMessage>>>>,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored turns for `id`.
    pub async fn len(&self, id: &str) -> usize {
        self.inner.read().await.get(id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, id: &str) -> Result<Vec<HistoryMessage>, HistoryError> {
        Ok(self.inner.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn append(&self, id: &str, messages: &[HistoryMessage]) -> Result<(), HistoryError> {
        let mut g = self.inner.write().await;
        g.entry(id.to_string())
            .or_default()
            .extend(messages.iter().cloned());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    #[serde(rename = "type")]
    role: Role,
    data: StoredData,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredData {
    content: String,
    #[serde(default)]
    additional_kwargs: serde_json::Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

fn encode_record(message: &HistoryMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StoredMessage {
        role: message.role,
        data: StoredData {
            content: message.content.clone(),
            additional_kwargs: serde_json::json!({}),
            role: Some(message.role),
        },
    })
}

fn decode_record(raw: &str) -> Result<HistoryMessage, serde_json::Error> {
    let stored: StoredMessage = serde_json::from_str(raw)?;
    Ok(HistoryMessage {
        role: stored.role,
        content: stored.data.content,
    })
}

/// Newest-first list elements to arrival order; unparseable records are skipped.
fn decode_list(key: &str, raw: Vec<String>) -> Vec<HistoryMessage> {
    raw.iter()
        .rev()
        .filter_map(|r| match decode_record(r) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("history: skipping unreadable record in {}: {}", key, e);
                None
            }
        })
        .collect()
}

/// Redis-backed history. Connects on first use and reconnects through the connection manager.
pub struct RedisHistoryStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    key_prefix: String,
    ttl_secs: Option<u64>,
}

impl RedisHistoryStore {
    /// Validates the URL; no connection is made until the first load/append.
    pub fn open(url: &str, key_prefix: impl Into<String>, ttl_secs: Option<u64>) -> Result<Self, HistoryError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
            key_prefix: key_prefix.into(),
            ttl_secs,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// EXPIRE seconds, saturated at `i64::MAX`.
    fn expire_secs(&self) -> Option<i64> {
        self.ttl_secs.map(|t| i64::try_from(t).unwrap_or(i64::MAX))
    }

    async fn connection(&self) -> Result<ConnectionManager, HistoryError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                log::info!("history: connecting to redis");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn load(&self, id: &str) -> Result<Vec<HistoryMessage>, HistoryError> {
        let key = self.key(id);
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        Ok(decode_list(&key, raw))
    }

    async fn append(&self, id: &str, messages: &[HistoryMessage]) -> Result<(), HistoryError> {
        if messages.is_empty() {
            return Ok(());
        }
        let key = self.key(id);
        let records = messages
            .iter()
            .map(encode_record)
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.lpush(&key, records).ignore();
        if let Some(ttl) = self.expire_secs() {
            pipe.expire(&key, ttl).ignore();
        }
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
