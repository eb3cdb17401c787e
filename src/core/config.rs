use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub memory: MemoryConfig,
    pub tools: ToolsConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    /// Short-term capacity per conversation (turns).
    pub short_term_capacity: usize,
    /// Shared-cache capacity per conversation (turns), must be >= short_term_capacity.
    pub shared_capacity: usize,
    pub shared_ttl_seconds: u64,
    pub redis_url: String,
    pub meilisearch_url: String,
    #[serde(default)]
    pub meilisearch_api_key: Option<String>,
    pub rag_limit: usize,
    pub rag_min_similarity: f64,
    /// Semantic hits younger than this are excluded from context injection.
    pub rag_freshness_floor_seconds: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolsConfig {
    pub call_timeout_seconds: u64,
    pub grid_data_url: String,
    #[serde(default)]
    pub openweather_api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    pub turn_timeout_seconds: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("inference.base_url", "http://localhost:11434")?
            .set_default("inference.model", "llama3.1:latest")?
            .set_default("inference.temperature", 0.1)?
            .set_default("inference.top_p", 0.9)?
            .set_default("inference.timeout_seconds", 120)?
            .set_default("memory.short_term_capacity", 20)?
            .set_default("memory.shared_capacity", 100)?
            .set_default("memory.shared_ttl_seconds", 1800)?
            .set_default("memory.redis_url", "redis://127.0.0.1:6379")?
            .set_default("memory.meilisearch_url", "http://localhost:7700")?
            .set_default("memory.rag_limit", 5)?
            .set_default("memory.rag_min_similarity", 0.2)?
            .set_default("memory.rag_freshness_floor_seconds", 300)?
            .set_default("tools.call_timeout_seconds", 10)?
            .set_default("tools.grid_data_url", "http://localhost:5000")?
            .set_default("agent.turn_timeout_seconds", 120)?
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("GRID_ASSIST").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
