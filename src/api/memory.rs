use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;

use crate::{core::memory::HybridMemory, models::error::ApiResult};

#[derive(Clone)]
pub struct MemoryState {
    pub memory: Arc<HybridMemory>,
}

/// `GET /v1/memory/:session_id/stats`
pub async fn get_stats(
    State(state): State<MemoryState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state.memory.stats(&session_id).await;
    Ok(Json(snapshot))
}

/// `DELETE /v1/memory/:session_id`
///
/// Empties the short-term and shared tiers for the conversation. The semantic
/// tier is left intact by design. Idempotent.
pub async fn clear_session(
    State(state): State<MemoryState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.memory.clear(&session_id).await;

    Ok(Json(json!({
        "status": "cleared",
        "sessionId": session_id,
    })))
}
