//! Meilisearch-backed semantic index.
//!
//! One index, `gridassist_messages`, holds every message ever seen across all
//! conversations. Search is scoped per conversation and the ranking score is
//! surfaced as the similarity used by the context-injection filter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meilisearch_sdk::client::Client;
use meilisearch_sdk::indexes::Index;
use meilisearch_sdk::settings::Settings;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::traits::{SemanticEntry, SemanticHit, SemanticIndex, SemanticStats};

pub const INDEX_MESSAGES: &str = "gridassist_messages";

#[derive(Clone, Debug)]
pub struct MeilisearchConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// Document structure for indexed messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDocument {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: i64, // Unix timestamp for sorting and the freshness filter
}

#[derive(Clone)]
pub struct MeilisearchSemanticIndex {
    client: Client,
}

impl MeilisearchSemanticIndex {
    pub async fn connect(config: MeilisearchConfig) -> Result<Self> {
        info!("Connecting to Meilisearch at {}", config.url);

        let client = Client::new(&config.url, config.api_key.as_deref())?;
        let index = Self { client };
        index.init_index().await?;

        info!("Connected to Meilisearch successfully");
        Ok(index)
    }

    async fn init_index(&self) -> Result<()> {
        self.client
            .create_index(INDEX_MESSAGES, Some("id"))
            .await
            .ok(); // Ignore if exists

        let messages_index = self.client.index(INDEX_MESSAGES);
        let settings = Settings::new()
            .with_searchable_attributes(["content", "role"])
            .with_filterable_attributes(["conversation_id", "role", "created_at"])
            .with_sortable_attributes(["created_at"]);

        messages_index
            .set_settings(&settings)
            .await
            .context("meilisearch settings update failed")?;

        Ok(())
    }

    fn messages_index(&self) -> Index {
        self.client.index(INDEX_MESSAGES)
    }
}

#[async_trait]
impl SemanticIndex for MeilisearchSemanticIndex {
    async fn index(&self, entry: SemanticEntry) -> Result<()> {
        let doc = MessageDocument {
            id: entry.message_id,
            conversation_id: entry.conversation_id,
            role: entry.role.as_str().to_string(),
            content: entry.content,
            created_at: entry.created_at.timestamp(),
        };

        self.messages_index()
            .add_documents(&[doc], Some("id"))
            .await
            .context("meilisearch indexing failed")?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>> {
        let index = self.messages_index();
        let filter = format!("conversation_id = \"{conversation_id}\"");

        let results = index
            .search()
            .with_query(query)
            .with_filter(&filter)
            .with_limit(limit)
            .with_show_ranking_score(true)
            .execute::<MessageDocument>()
            .await
            .context("meilisearch search failed")?;

        Ok(results
            .hits
            .into_iter()
            .map(|hit| SemanticHit {
                similarity: hit.ranking_score.unwrap_or(0.0),
                created_at: DateTime::<Utc>::from_timestamp(hit.result.created_at, 0)
                    .unwrap_or_else(Utc::now),
                content: hit.result.content,
            })
            .collect())
    }

    async fn stats(&self) -> Result<SemanticStats> {
        let stats = self
            .messages_index()
            .get_stats()
            .await
            .context("meilisearch stats failed")?;

        Ok(SemanticStats {
            document_count: stats.number_of_documents,
            available: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[tokio::test]
    #[ignore]
    async fn test_index_and_search_against_local_meilisearch() {
        let index = MeilisearchSemanticIndex::connect(MeilisearchConfig {
            url: "http://localhost:7700".to_string(),
            api_key: None,
        })
        .await
        .unwrap();

        index
            .index(SemanticEntry {
                message_id: "meili-test-1".to_string(),
                conversation_id: "meili-test".to_string(),
                role: Role::User,
                content: "What is the current grid voltage?".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Wait for indexing
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

        let hits = index.search("voltage", "meili-test", 10).await.unwrap();
        assert!(!hits.is_empty());
    }
}
