use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod core;
mod middleware;
mod models;
mod utils;

use crate::api::chat::ChatState;
use crate::api::memory::MemoryState;
use crate::core::{
    agent::Agent,
    config::Settings,
    inference::OllamaEngine,
    memory::{
        DurableMessageStore, HybridConfig, HybridMemory, InMemoryDurableStore,
        InMemorySemanticIndex, InMemorySharedCache, MeilisearchConfig, MeilisearchSemanticIndex,
        RedisSharedCache, SemanticIndex, SharedCacheStore,
    },
    tools::{CompanyInfoTool, GridDataTool, Tool, ToolCatalog, ToolExecutor, WeatherTool},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;

    info!(
        "Starting grid-assist API on {}:{}",
        settings.server.host, settings.server.port
    );

    let app = create_app(settings.clone()).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn create_app(settings: Settings) -> Result<Router> {
    use axum::middleware as axum_middleware;

    use crate::middleware::{error_handler, request_id};

    let cors = CorsLayer::permissive();

    // Shared cache: Redis, degrading to an in-process stand-in when unreachable.
    let shared: Arc<dyn SharedCacheStore> = match RedisSharedCache::connect(
        &settings.memory.redis_url,
        settings.memory.shared_ttl_seconds,
    )
    .await
    {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, "Redis unavailable, shared cache degraded to in-process storage");
            Arc::new(InMemorySharedCache::new())
        },
    };

    // Semantic index: Meilisearch, same degradation story.
    let semantic: Arc<dyn SemanticIndex> = match MeilisearchSemanticIndex::connect(
        MeilisearchConfig {
            url: settings.memory.meilisearch_url.clone(),
            api_key: settings.memory.meilisearch_api_key.clone(),
        },
    )
    .await
    {
        Ok(index) => Arc::new(index),
        Err(e) => {
            warn!(error = %e, "Meilisearch unavailable, semantic index degraded to in-process storage");
            Arc::new(InMemorySemanticIndex::new())
        },
    };

    // Stand-in for the relational message store this service consumes.
    let durable: Arc<dyn DurableMessageStore> = Arc::new(InMemoryDurableStore::new());

    let memory = Arc::new(HybridMemory::new(
        shared,
        semantic,
        durable,
        HybridConfig {
            short_term_capacity: settings.memory.short_term_capacity,
            shared_capacity: settings.memory.shared_capacity,
            rag_limit: settings.memory.rag_limit,
            rag_min_similarity: settings.memory.rag_min_similarity,
            rag_freshness_floor: chrono::Duration::seconds(
                settings.memory.rag_freshness_floor_seconds,
            ),
        },
    ));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.tools.call_timeout_seconds))
        .build()?;

    // A duplicate registration here is a fatal configuration error.
    let catalog = ToolCatalog::new(vec![
        Arc::new(GridDataTool::new(
            http_client.clone(),
            settings.tools.grid_data_url.clone(),
        )) as Arc<dyn Tool>,
        Arc::new(WeatherTool::new(
            http_client,
            settings.tools.openweather_api_key.clone(),
        )),
        Arc::new(CompanyInfoTool),
    ])?;
    let executor = Arc::new(ToolExecutor::new(
        catalog,
        Duration::from_secs(settings.tools.call_timeout_seconds),
    ));

    let engine = Arc::new(OllamaEngine::new(&settings.inference));

    let agent = Arc::new(Agent::new(
        memory.clone(),
        engine,
        executor,
        Duration::from_secs(settings.agent.turn_timeout_seconds),
    ));

    let chat_routes = Router::new()
        .route("/v1/chat", post(api::chat::chat))
        .with_state(ChatState { agent });

    let memory_routes = Router::new()
        .route("/v1/memory/:session_id/stats", get(api::memory::get_stats))
        .route("/v1/memory/:session_id", delete(api::memory::clear_session))
        .with_state(MemoryState { memory });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(chat_routes)
        .merge(memory_routes)
        .layer(axum_middleware::from_fn(request_id::add_request_id))
        .layer(axum_middleware::from_fn(error_handler::handle_errors))
        .layer(cors);

    Ok(app)
}

async fn health_check() -> &'static str {
    "OK"
}
