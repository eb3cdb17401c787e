//! In-process implementations of the tier backends.
//!
//! Used when the real backends are unreachable at startup and throughout the
//! test suite. Data is lost when the process exits.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::models::chat::ConversationTurn;

use super::traits::{
    DurableMessageStore, SemanticEntry, SemanticHit, SemanticIndex, SemanticStats,
    SharedCacheStore,
};

/// In-process stand-in for the shared cache tier. No TTL; the coordinator's
/// capacity trimming still applies.
#[derive(Default)]
pub struct InMemorySharedCache {
    map: DashMap<String, Vec<ConversationTurn>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCacheStore for InMemorySharedCache {
    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .map
            .get(conversation_id)
            .map(|turns| turns.clone())
            .unwrap_or_default())
    }

    async fn store(&self, conversation_id: &str, turns: &[ConversationTurn]) -> Result<()> {
        self.map.insert(conversation_id.to_string(), turns.to_vec());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.map.remove(conversation_id);
        Ok(())
    }
}

/// Keyword-overlap semantic index. A stand-in scoring, not a real embedding
/// space, but it preserves the search contract end to end.
#[derive(Default)]
pub struct InMemorySemanticIndex {
    docs: RwLock<Vec<SemanticEntry>>,
}

impl InMemorySemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn keyword_match_score(query: &str, content: &str) -> f64 {
        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();
        let content_lower = content.to_lowercase();

        if query_words.is_empty() {
            return 0.0;
        }

        let matches = query_words
            .iter()
            .filter(|word| content_lower.contains(*word))
            .count();

        matches as f64 / query_words.len() as f64
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn index(&self, entry: SemanticEntry) -> Result<()> {
        self.docs.write().push(entry);
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>> {
        let docs = self.docs.read();
        let mut hits: Vec<SemanticHit> = docs
            .iter()
            .filter(|doc| doc.conversation_id == conversation_id)
            .filter_map(|doc| {
                let similarity = Self::keyword_match_score(query, &doc.content);
                (similarity > 0.0).then(|| SemanticHit {
                    content: doc.content.clone(),
                    similarity,
                    created_at: doc.created_at,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        Ok(hits)
    }

    async fn stats(&self) -> Result<SemanticStats> {
        Ok(SemanticStats {
            document_count: self.docs.read().len(),
            available: true,
        })
    }
}

struct DurableRecord {
    active: bool,
    turns: Vec<ConversationTurn>,
}

/// In-process stand-in for the relational message store.
#[derive(Default)]
pub struct InMemoryDurableStore {
    map: DashMap<String, DurableRecord>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.map
            .get(conversation_id)
            .map(|r| r.active)
            .unwrap_or(false)
    }
}

#[async_trait]
impl DurableMessageStore for InMemoryDurableStore {
    async fn load_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .map
            .get(conversation_id)
            .filter(|record| record.active)
            .map(|record| {
                let start = record.turns.len().saturating_sub(limit);
                record.turns[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn append(&self, conversation_id: &str, turn: &ConversationTurn) -> Result<()> {
        self.map
            .entry(conversation_id.to_string())
            .or_insert_with(|| DurableRecord {
                active: true,
                turns: Vec::new(),
            })
            .turns
            .push(turn.clone());
        Ok(())
    }

    async fn mark_inactive(&self, conversation_id: &str) -> Result<()> {
        if let Some(mut record) = self.map.get_mut(conversation_id) {
            record.active = false;
        }
        Ok(())
    }
}
