//! Trait seams for the memory tiers and the durable message store.
//!
//! Implementations must be thread-safe (Send + Sync) as they are shared
//! across all in-flight turns.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::chat::{ConversationTurn, Role};

/// Network-shared, TTL-bound cache of the recent turn window.
///
/// The stored list is the durable source of truth across process restarts;
/// the short-term log is rehydrated from it.
#[async_trait]
pub trait SharedCacheStore: Send + Sync {
    /// Load the full cached turn list for a conversation (empty if absent).
    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>>;

    /// Overwrite the cached turn list for a conversation, refreshing its TTL.
    async fn store(&self, conversation_id: &str, turns: &[ConversationTurn]) -> Result<()>;

    /// Drop the cached turn list for a conversation.
    async fn delete(&self, conversation_id: &str) -> Result<()>;
}

/// A message queued for semantic indexing.
#[derive(Debug, Clone)]
pub struct SemanticEntry {
    pub message_id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A similarity-search hit.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub content: String,
    pub similarity: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticStats {
    pub document_count: usize,
    pub available: bool,
}

impl Default for SemanticStats {
    fn default() -> Self {
        Self {
            document_count: 0,
            available: false,
        }
    }
}

/// Similarity-searchable archive of every message ever seen.
///
/// Used only for context injection, never for turn ordering, and
/// intentionally untouched by conversation deletion.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn index(&self, entry: SemanticEntry) -> Result<()>;

    async fn search(
        &self,
        query: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>>;

    async fn stats(&self) -> Result<SemanticStats>;
}

/// Outbound collaborator: the relational message store.
///
/// The service consumes this interface; it does not own the schema behind it.
#[async_trait]
pub trait DurableMessageStore: Send + Sync {
    async fn load_recent(&self, conversation_id: &str, limit: usize)
    -> Result<Vec<ConversationTurn>>;

    async fn append(&self, conversation_id: &str, turn: &ConversationTurn) -> Result<()>;

    async fn mark_inactive(&self, conversation_id: &str) -> Result<()>;
}
