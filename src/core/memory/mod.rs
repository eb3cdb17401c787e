//! Tiered conversation memory.
//!
//! Three layers, coordinated by [`HybridMemory`]:
//!
//! - **Short-term**: process-local bounded turn log, the fast path
//! - **Shared**: Redis-backed TTL window, the restart-surviving source of truth
//! - **Semantic**: Meilisearch archive of everything ever said, used only for
//!   context injection
//!
//! Reads prefer the short-term log and rehydrate it from the shared cache when
//! empty; writes flow through all layers with graceful degradation.

mod hybrid;
mod in_memory;
mod meilisearch;
mod redis;
mod short_term;
mod traits;

#[allow(unused_imports)]
pub use hybrid::{AssembledHistory, HybridConfig, HybridMemory, MemorySnapshot};
pub use in_memory::{InMemoryDurableStore, InMemorySemanticIndex, InMemorySharedCache};
pub use meilisearch::{MeilisearchConfig, MeilisearchSemanticIndex};
pub use redis::RedisSharedCache;
#[allow(unused_imports)]
pub use traits::{
    DurableMessageStore, SemanticEntry, SemanticHit, SemanticIndex, SemanticStats,
    SharedCacheStore,
};
