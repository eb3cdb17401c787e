//! Redis-backed shared cache.
//!
//! The turn window of each conversation is stored as one JSON blob under
//! `chat:context:{id}` with a TTL, so a process restart rehydrates from here
//! and idle conversations age out on their own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::models::chat::ConversationTurn;

use super::traits::SharedCacheStore;

pub struct RedisSharedCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSharedCache {
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("redis connection failed")?;

        info!("Connected to Redis at {}", url);
        Ok(Self { conn, ttl_seconds })
    }

    fn context_key(conversation_id: &str) -> String {
        format!("chat:context:{conversation_id}")
    }
}

#[async_trait]
impl SharedCacheStore for RedisSharedCache {
    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::context_key(conversation_id))
            .query_async(&mut conn)
            .await
            .context("redis GET failed")?;

        match raw {
            Some(payload) => {
                serde_json::from_str(&payload).context("corrupt chat context payload")
            },
            None => Ok(Vec::new()),
        }
    }

    async fn store(&self, conversation_id: &str, turns: &[ConversationTurn]) -> Result<()> {
        let payload = serde_json::to_string(turns)?;
        let mut conn = self.conn.clone();
        redis::cmd("SETEX")
            .arg(Self::context_key(conversation_id))
            .arg(self.ttl_seconds)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis SETEX failed")?;
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::context_key(conversation_id))
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis DEL failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_key_shape() {
        assert_eq!(RedisSharedCache::context_key("s1"), "chat:context:s1");
    }

    #[tokio::test]
    #[ignore]
    async fn test_roundtrip_against_local_redis() {
        let cache = RedisSharedCache::connect("redis://127.0.0.1:6379", 60)
            .await
            .unwrap();

        let turns = vec![ConversationTurn::user("ping")];
        cache.store("redis-test", &turns).await.unwrap();

        let loaded = cache.load("redis-test").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "ping");

        cache.delete("redis-test").await.unwrap();
        assert!(cache.load("redis-test").await.unwrap().is_empty());
    }
}
