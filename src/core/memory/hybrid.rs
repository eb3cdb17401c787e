//! The memory coordinator fronting all three tiers.
//!
//! Write path: short-term log first, then the shared cache (retried once,
//! degraded on failure), then detached best-effort writes to the semantic
//! index and the durable store. Read path: short-term if populated, else
//! rehydrate from the shared cache, else fall back to the durable store.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::retry::{RetryConfig, RetryPolicy};
use crate::models::chat::{ConversationTurn, RagContextItem};

use super::short_term::ShortTermStore;
use super::traits::{
    DurableMessageStore, SemanticEntry, SemanticIndex, SemanticStats, SharedCacheStore,
};

#[derive(Clone, Debug)]
pub struct HybridConfig {
    /// Short-term log capacity per conversation.
    pub short_term_capacity: usize,
    /// Shared-cache capacity per conversation. Must be >= short_term_capacity.
    pub shared_capacity: usize,
    pub rag_limit: usize,
    pub rag_min_similarity: f64,
    /// Hits younger than this are excluded so the agent does not treat its
    /// own immediately-preceding turns as independent supporting evidence.
    pub rag_freshness_floor: ChronoDuration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 20,
            shared_capacity: 100,
            rag_limit: 5,
            rag_min_similarity: 0.2,
            rag_freshness_floor: ChronoDuration::minutes(5),
        }
    }
}

/// The merged view handed to the agent loop. `turns` starts with any
/// synthetic context turns; those are never persisted.
#[derive(Debug)]
pub struct AssembledHistory {
    pub turns: Vec<ConversationTurn>,
    pub rag_injected: usize,
    pub rag_degraded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub conversation_id: String,
    pub short_term_count: usize,
    pub shared_count: usize,
    pub semantic: SemanticStats,
}

pub struct HybridMemory {
    short_term: ShortTermStore,
    shared: Arc<dyn SharedCacheStore>,
    semantic: Arc<dyn SemanticIndex>,
    durable: Arc<dyn DurableMessageStore>,
    config: HybridConfig,
    retry: RetryPolicy,
    guards: DashMap<String, Arc<Mutex<()>>>,
}

impl HybridMemory {
    pub fn new(
        shared: Arc<dyn SharedCacheStore>,
        semantic: Arc<dyn SemanticIndex>,
        durable: Arc<dyn DurableMessageStore>,
        config: HybridConfig,
    ) -> Self {
        Self {
            short_term: ShortTermStore::new(config.short_term_capacity),
            shared,
            semantic,
            durable,
            config,
            retry: RetryPolicy::new(RetryConfig::default()),
            guards: DashMap::new(),
        }
    }

    /// Per-conversation ownership lock. Turns for one conversation are
    /// serialized on this; different conversations never contend.
    pub fn turn_guard(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.guards
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a turn to all tiers. Returns once the turn is in the short-term
    /// log and the shared cache write has either succeeded or been downgraded;
    /// semantic and durable writes are detached.
    pub async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> String {
        let turn_id = turn.id.clone();
        self.short_term.push(conversation_id, turn.clone());

        let flushed = self
            .retry
            .execute("shared cache append", || async {
                let mut turns = self.shared.load(conversation_id).await?;
                turns.push(turn.clone());
                if turns.len() > self.config.shared_capacity {
                    let excess = turns.len() - self.config.shared_capacity;
                    turns.drain(0..excess);
                }
                self.shared.store(conversation_id, &turns).await
            })
            .await
            .is_ok();

        if flushed {
            self.short_term.mark_flushed(conversation_id, &turn_id);
        } else {
            // Availability over durability: the turn stays appended on the
            // strength of the short-term copy alone, and stays evict-exempt.
            warn!(
                conversation = conversation_id,
                turn = %turn_id,
                "shared cache write failed, turn durability downgraded"
            );
        }
        self.short_term.evict_to_capacity(conversation_id);

        if !turn.content.trim().is_empty() {
            let semantic = self.semantic.clone();
            let entry = SemanticEntry {
                message_id: turn_id.clone(),
                conversation_id: conversation_id.to_string(),
                role: turn.role,
                content: turn.content.clone(),
                created_at: turn.created_at,
            };
            tokio::spawn(async move {
                if let Err(e) = semantic.index(entry).await {
                    warn!(error = %e, "semantic index write failed");
                }
            });
        }

        let durable = self.durable.clone();
        let durable_turn = turn.clone();
        let durable_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = durable.append(&durable_id, &durable_turn).await {
                warn!(error = %e, conversation = %durable_id, "durable store write failed");
            }
        });

        turn_id
    }

    /// Ordered history for a conversation, optionally widened with semantic
    /// context for `rag_query`. The merged view is never persisted.
    pub async fn history(
        &self,
        conversation_id: &str,
        rag_query: Option<&str>,
    ) -> AssembledHistory {
        let mut turns = self.short_term.turns(conversation_id);

        if turns.is_empty() {
            turns = self.rehydrate(conversation_id).await;
        }

        let mut rag_injected = 0;
        let mut rag_degraded = false;

        if let Some(query) = rag_query
            && !query.trim().is_empty()
        {
            match self
                .semantic
                .search(query, conversation_id, self.config.rag_limit)
                .await
            {
                Ok(hits) => {
                    let now = Utc::now();
                    let context: Vec<ConversationTurn> = hits
                        .into_iter()
                        .map(|hit| RagContextItem {
                            content: hit.content,
                            similarity: hit.similarity,
                            original_timestamp: hit.created_at,
                        })
                        .filter(|item| {
                            now - item.original_timestamp >= self.config.rag_freshness_floor
                                && item.similarity >= self.config.rag_min_similarity
                        })
                        .map(RagContextItem::into_context_turn)
                        .collect();

                    rag_injected = context.len();
                    if rag_injected > 0 {
                        debug!(
                            conversation = conversation_id,
                            injected = rag_injected,
                            "prepending semantic context"
                        );
                        let mut merged = context;
                        merged.extend(turns);
                        turns = merged;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "semantic search failed, skipping context injection");
                    rag_degraded = true;
                },
            }
        }

        AssembledHistory {
            turns,
            rag_injected,
            rag_degraded,
        }
    }

    /// Rebuild the short-term log after a restart or eviction wipe. The
    /// shared cache is authoritative; the durable store covers the case where
    /// the cached window has already expired.
    async fn rehydrate(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        let recent = match self.shared.load(conversation_id).await {
            Ok(shared_turns) if !shared_turns.is_empty() => {
                let start = shared_turns
                    .len()
                    .saturating_sub(self.config.short_term_capacity);
                shared_turns[start..].to_vec()
            },
            Ok(_) => match self
                .durable
                .load_recent(conversation_id, self.config.short_term_capacity)
                .await
            {
                Ok(durable_turns) => durable_turns,
                Err(e) => {
                    warn!(error = %e, "durable store read failed, continuing with empty history");
                    Vec::new()
                },
            },
            Err(e) => {
                warn!(error = %e, "shared cache read failed, falling back to durable store");
                self.durable
                    .load_recent(conversation_id, self.config.short_term_capacity)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "durable store read failed, continuing with empty history");
                        Vec::new()
                    })
            },
        };

        if !recent.is_empty() {
            info!(
                conversation = conversation_id,
                turns = recent.len(),
                "rehydrated short-term memory"
            );
            self.short_term.replay(conversation_id, recent.clone());
        }

        recent
    }

    /// Empty the short-term log and the shared cache, and mark the
    /// conversation inactive downstream. The semantic tier is left intact:
    /// long-term learning data outlives individual conversation deletion.
    pub async fn clear(&self, conversation_id: &str) {
        self.short_term.remove(conversation_id);

        if let Err(e) = self.shared.delete(conversation_id).await {
            warn!(error = %e, "shared cache delete failed");
        }
        if let Err(e) = self.durable.mark_inactive(conversation_id).await {
            warn!(error = %e, "durable store mark_inactive failed");
        }

        info!(conversation = conversation_id, "conversation memory cleared");
    }

    pub async fn stats(&self, conversation_id: &str) -> MemorySnapshot {
        let shared_count = match self.shared.load(conversation_id).await {
            Ok(turns) => turns.len(),
            Err(e) => {
                warn!(error = %e, "shared cache read failed during stats");
                0
            },
        };

        let semantic = match self.semantic.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "semantic stats unavailable");
                SemanticStats::default()
            },
        };

        MemorySnapshot {
            conversation_id: conversation_id.to_string(),
            short_term_count: self.short_term.len(conversation_id),
            shared_count,
            semantic,
        }
    }

    /// Short-term-only view, bypassing rehydration. Diagnostic.
    #[cfg(test)]
    pub fn short_term_turns(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        self.short_term.turns(conversation_id)
    }

    #[cfg(test)]
    pub fn wipe_short_term(&self, conversation_id: &str) {
        self.short_term.remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::in_memory::{
        InMemoryDurableStore, InMemorySemanticIndex, InMemorySharedCache,
    };
    use crate::core::memory::traits::SemanticHit;
    use crate::models::chat::Role;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    struct FailingSharedCache;

    #[async_trait]
    impl SharedCacheStore for FailingSharedCache {
        async fn load(&self, _: &str) -> Result<Vec<ConversationTurn>> {
            Err(anyhow!("connection refused"))
        }
        async fn store(&self, _: &str, _: &[ConversationTurn]) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn delete(&self, _: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    struct FailingSemanticIndex;

    #[async_trait]
    impl SemanticIndex for FailingSemanticIndex {
        async fn index(&self, _: SemanticEntry) -> Result<()> {
            Err(anyhow!("index unreachable"))
        }
        async fn search(&self, _: &str, _: &str, _: usize) -> Result<Vec<SemanticHit>> {
            Err(anyhow!("index unreachable"))
        }
        async fn stats(&self) -> Result<SemanticStats> {
            Err(anyhow!("index unreachable"))
        }
    }

    fn memory_with(config: HybridConfig) -> HybridMemory {
        HybridMemory::new(
            Arc::new(InMemorySharedCache::new()),
            Arc::new(InMemorySemanticIndex::new()),
            Arc::new(InMemoryDurableStore::new()),
            config,
        )
    }

    fn default_memory() -> HybridMemory {
        memory_with(HybridConfig::default())
    }

    #[tokio::test]
    async fn test_append_then_history_roundtrip() {
        let memory = default_memory();
        let turn = ConversationTurn::tool_result(
            "getGridData",
            &serde_json::json!({"voltage": "121.3 V"}),
        );
        let expected_id = turn.id.clone();

        memory.append("c1", turn).await;
        let history = memory.history("c1", None).await;

        assert_eq!(history.turns.len(), 1);
        let read = &history.turns[0];
        assert_eq!(read.id, expected_id);
        assert_eq!(read.role, Role::Tool);
        assert_eq!(read.tool_call_id.as_deref(), Some("getGridData"));
        assert!(read.content.contains("121.3 V"));
    }

    #[tokio::test]
    async fn test_history_is_ordered_without_duplicates() {
        let memory = default_memory();
        for i in 0..10 {
            memory
                .append("c1", ConversationTurn::user(format!("turn {i}")))
                .await;
        }

        let history = memory.history("c1", None).await;
        assert_eq!(history.turns.len(), 10);

        let mut seen = std::collections::HashSet::new();
        for pair in history.turns.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
        for turn in &history.turns {
            assert!(seen.insert(turn.id.clone()), "duplicate turn {}", turn.id);
        }
    }

    #[tokio::test]
    async fn test_rehydration_from_shared_cache() {
        let memory = memory_with(HybridConfig {
            short_term_capacity: 5,
            ..Default::default()
        });

        for i in 0..5 {
            memory
                .append("c1", ConversationTurn::user(format!("turn {i}")))
                .await;
        }

        // Simulate a process restart losing the in-process tier.
        memory.wipe_short_term("c1");
        assert!(memory.short_term_turns("c1").is_empty());

        let history = memory.history("c1", None).await;
        assert_eq!(history.turns.len(), 5);
        for (i, turn) in history.turns.iter().enumerate() {
            assert_eq!(turn.content, format!("turn {i}"));
        }

        // And the short-term tier is populated again.
        assert_eq!(memory.short_term_turns("c1").len(), 5);
    }

    #[tokio::test]
    async fn test_short_term_eviction_is_fifo() {
        let capacity = 3;
        let memory = memory_with(HybridConfig {
            short_term_capacity: capacity,
            ..Default::default()
        });

        for i in 0..(capacity + 1) {
            memory
                .append("c1", ConversationTurn::user(format!("turn {i}")))
                .await;
        }

        let local = memory.short_term_turns("c1");
        assert_eq!(local.len(), capacity);
        assert_eq!(local[0].content, "turn 1");
        assert_eq!(local.last().unwrap().content, "turn 3");
    }

    #[tokio::test]
    async fn test_shared_capacity_trims_oldest() {
        let shared = Arc::new(InMemorySharedCache::new());
        let memory = HybridMemory::new(
            shared.clone(),
            Arc::new(InMemorySemanticIndex::new()),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig {
                short_term_capacity: 2,
                shared_capacity: 4,
                ..Default::default()
            },
        );

        for i in 0..6 {
            memory
                .append("c1", ConversationTurn::user(format!("turn {i}")))
                .await;
        }

        let cached = shared.load("c1").await.unwrap();
        assert_eq!(cached.len(), 4);
        assert_eq!(cached[0].content, "turn 2");
        assert_eq!(cached[3].content, "turn 5");
    }

    #[tokio::test]
    async fn test_append_survives_shared_and_semantic_outage() {
        let memory = HybridMemory::new(
            Arc::new(FailingSharedCache),
            Arc::new(FailingSemanticIndex),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig::default(),
        );

        memory
            .append("c1", ConversationTurn::user("still here"))
            .await;

        let history = memory.history("c1", None).await;
        assert_eq!(history.turns.len(), 1);
        assert_eq!(history.turns[0].content, "still here");
    }

    #[tokio::test]
    async fn test_unflushed_turns_survive_eviction_pressure() {
        let memory = HybridMemory::new(
            Arc::new(FailingSharedCache),
            Arc::new(InMemorySemanticIndex::new()),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig {
                short_term_capacity: 2,
                ..Default::default()
            },
        );

        for i in 0..4 {
            memory
                .append("c1", ConversationTurn::user(format!("turn {i}")))
                .await;
        }

        // Nothing reached the shared cache, so nothing was safe to evict.
        assert_eq!(memory.short_term_turns("c1").len(), 4);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent_and_leaves_semantic_tier() {
        let semantic = Arc::new(InMemorySemanticIndex::new());
        let memory = HybridMemory::new(
            Arc::new(InMemorySharedCache::new()),
            semantic.clone(),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig::default(),
        );

        memory
            .append("c1", ConversationTurn::user("remember the substation outage"))
            .await;
        // Let the detached index write land.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        memory.clear("c1").await;
        memory.clear("c1").await; // second call is a no-op, not an error

        let history = memory.history("c1", None).await;
        assert!(history.turns.is_empty());

        let stats = semantic.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
    }

    #[tokio::test]
    async fn test_rag_injection_filters_by_freshness_and_similarity() {
        let semantic = Arc::new(InMemorySemanticIndex::new());
        let memory = HybridMemory::new(
            Arc::new(InMemorySharedCache::new()),
            semantic.clone(),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig {
                rag_min_similarity: 0.5,
                ..Default::default()
            },
        );

        let old = Utc::now() - ChronoDuration::minutes(30);
        for (id, content, created_at) in [
            ("old-relevant", "voltage dropped during the storm", old),
            ("too-fresh", "voltage is being discussed right now", Utc::now()),
            ("old-unrelated", "lunch menu for the cafeteria", old),
        ] {
            semantic
                .index(SemanticEntry {
                    message_id: id.to_string(),
                    conversation_id: "c1".to_string(),
                    role: Role::User,
                    content: content.to_string(),
                    created_at,
                })
                .await
                .unwrap();
        }

        memory
            .append("c1", ConversationTurn::user("tell me about voltage"))
            .await;

        let history = memory.history("c1", Some("voltage dropped storm")).await;
        assert_eq!(history.rag_injected, 1);
        assert!(!history.rag_degraded);

        let context = &history.turns[0];
        assert_eq!(context.role, Role::System);
        assert!(context.id.starts_with("rag_"));
        assert!(context.content.starts_with("[CONTEXT] voltage dropped"));
        // Persisted history follows the synthetic prefix.
        assert_eq!(history.turns.last().unwrap().content, "tell me about voltage");
    }

    #[tokio::test]
    async fn test_rag_degrades_when_semantic_tier_is_down() {
        let memory = HybridMemory::new(
            Arc::new(InMemorySharedCache::new()),
            Arc::new(FailingSemanticIndex),
            Arc::new(InMemoryDurableStore::new()),
            HybridConfig::default(),
        );

        memory.append("c1", ConversationTurn::user("hello")).await;
        let history = memory.history("c1", Some("hello")).await;

        assert!(history.rag_degraded);
        assert_eq!(history.rag_injected, 0);
        assert_eq!(history.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_reports_tier_counts() {
        let memory = default_memory();
        memory.append("c1", ConversationTurn::user("one")).await;
        memory.append("c1", ConversationTurn::assistant("two")).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = memory.stats("c1").await;
        assert_eq!(snapshot.conversation_id, "c1");
        assert_eq!(snapshot.short_term_count, 2);
        assert_eq!(snapshot.shared_count, 2);
        assert!(snapshot.semantic.available);
        assert_eq!(snapshot.semantic.document_count, 2);
    }

    #[tokio::test]
    async fn test_rehydration_falls_back_to_durable_store() {
        let durable = Arc::new(InMemoryDurableStore::new());
        for i in 0..3 {
            durable
                .append("c1", &ConversationTurn::user(format!("archived {i}")))
                .await
                .unwrap();
        }

        let memory = HybridMemory::new(
            Arc::new(InMemorySharedCache::new()), // empty: the TTL'd window expired
            Arc::new(InMemorySemanticIndex::new()),
            durable,
            HybridConfig::default(),
        );

        let history = memory.history("c1", None).await;
        assert_eq!(history.turns.len(), 3);
        assert_eq!(history.turns[0].content, "archived 0");
    }
}
