use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    core::agent::{Agent, TurnError},
    models::{
        chat::{ChatRequest, TurnEvent},
        error::{ApiError, ApiResult},
    },
    utils::streaming::create_sse_stream,
};

#[derive(Clone)]
pub struct ChatState {
    pub agent: Arc<Agent>,
}

/// `POST /v1/chat`
///
/// Runs one conversational turn and streams it back as SSE: `token` frames
/// while the answer is produced, then a single `complete` frame.
pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));

    info!(
        session = %session_id,
        caller = request.user.as_deref().unwrap_or("anonymous"),
        "processing chat message ({} chars)",
        message.len()
    );

    let (tx, rx) = mpsc::channel::<TurnEvent>(64);
    let agent = state.agent.clone();
    let turn_session = session_id.clone();

    tokio::spawn(async move {
        match agent.run_turn(&turn_session, &message, &tx).await {
            Ok(_) => {},
            Err(TurnError::Disconnected) => {
                debug!(session = %turn_session, "client disconnected mid-turn");
            },
            Err(e) => {
                error!(session = %turn_session, error = %e, "turn failed");
                let _ = tx
                    .send(TurnEvent::Error {
                        content: "An error occurred while processing your request.".to_string(),
                    })
                    .await;
            },
        }
    });

    Ok(create_sse_stream(ReceiverStream::new(rx)))
}
