//! The streaming agent loop.
//!
//! One conversational turn runs: assemble context → first inference →
//! (tool dispatch → second inference)? → finalize. Tokens flow to the caller
//! through an mpsc channel as they are produced; the completed turn is
//! written back through the memory coordinator.

use chrono::Utc;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::inference::{InferenceEngine, InferenceError, ModelReply, WireMessage};
use crate::core::memory::HybridMemory;
use crate::core::retry::{RetryConfig, RetryPolicy};
use crate::core::tools::ToolExecutor;
use crate::models::chat::{ConversationTurn, ToolCallRequest, TurnEvent, TurnMetadata};
use crate::utils::text_chunker::chunk_text;

const SYSTEM_DIRECTIVE: &str = "\
You are the assistant for SinCos Automation Technologies Ltd. You provide expert \
energy grid analysis, weather information, and company information, using the \
available tools for real-time data. Analyze the user's request first and decide \
which tools, if any, to call.

WEATHER QUERIES:
- Only call getWeather when the user names a specific city or location in their message.
- If no location is given, do NOT call the tool. Ask which city or location they want instead.
- Never assume or default to a location such as \"New York\" or \"current location\".
- If you previously asked for a location and the user replies with one, call getWeather with it immediately.

GRID DATA QUERIES:
- Always use getGridData for grid status, power, voltage, demand, frequency, or energy metrics.
- getGridData needs no location; never ask for one on grid queries.

COMPANY INFO QUERIES:
- Always use getCompanyInfo for questions about the company, its services, products, or contact details.

RESPONSE STYLE:
- Be conversational and helpful, and present the data naturally.
- Never mention tools, tool calling, or implementation details to the user.";

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("turn aborted after {0:?}")]
    Timeout(Duration),

    #[error("caller disconnected")]
    Disconnected,

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub tools_used: Vec<String>,
}

pub struct Agent {
    memory: Arc<HybridMemory>,
    engine: Arc<dyn InferenceEngine>,
    executor: Arc<ToolExecutor>,
    retry: RetryPolicy,
    turn_timeout: Duration,
}

impl Agent {
    pub fn new(
        memory: Arc<HybridMemory>,
        engine: Arc<dyn InferenceEngine>,
        executor: Arc<ToolExecutor>,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            memory,
            engine,
            executor,
            retry: RetryPolicy::new(RetryConfig {
                initial_delay_ms: 200,
                ..Default::default()
            }),
            turn_timeout,
        }
    }

    /// Run one conversational turn, streaming events into `tx`.
    pub async fn run_turn(
        &self,
        session_id: &str,
        message: &str,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome, TurnError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(TurnError::Validation("message is required".to_string()));
        }

        // Serializes turns of one conversation. Held across the whole turn,
        // inference round-trips included; narrowing it to the memory
        // mutations would stop a slow model call from stalling the
        // conversation's next turn, at the price of re-validating history
        // ordering on re-entry.
        let guard = self.memory.turn_guard(session_id);
        let _turn = guard.lock().await;

        let deadline = Instant::now() + self.turn_timeout;
        info!(session = session_id, "starting turn");

        // AssembleContext
        let assembled = self.memory.history(session_id, Some(message)).await;
        if assembled.rag_degraded {
            debug!(session = session_id, "context injection skipped this turn");
        } else if assembled.rag_injected > 0 {
            debug!(
                session = session_id,
                items = assembled.rag_injected,
                "semantic context injected"
            );
        }

        let mut messages = Vec::with_capacity(assembled.turns.len() + 2);
        messages.push(WireMessage::system(SYSTEM_DIRECTIVE));
        messages.extend(assembled.turns.iter().map(WireMessage::from_turn));
        messages.push(WireMessage::user(message));

        self.memory
            .append(session_id, ConversationTurn::user(message))
            .await;

        // FirstInference
        let schemas = self.executor.schemas();
        let first = self
            .with_deadline(deadline, async {
                self.retry
                    .execute("first inference", || {
                        self.engine.complete(&messages, Some(&schemas))
                    })
                    .await
            })
            .await?;

        let outcome = if first.tool_calls.is_empty() {
            // DirectAnswer
            self.stream_text(session_id, first.content, Vec::new(), tx)
                .await?
        } else {
            self.dispatch_and_answer(session_id, first, tx, deadline)
                .await?
        };

        let completion = TurnEvent::Complete {
            response: outcome.response.clone(),
            tools_used: outcome.tools_used.clone(),
            session_id: session_id.to_string(),
            metadata: TurnMetadata {
                timestamp: Utc::now(),
                success: true,
            },
        };
        if tx.send(completion).await.is_err() {
            debug!(session = session_id, "caller gone before completion record");
        }

        info!(
            session = session_id,
            tools = ?outcome.tools_used,
            response_len = outcome.response.len(),
            "turn complete"
        );
        Ok(outcome)
    }

    /// ToolDispatch → SecondInference → Finalize.
    async fn dispatch_and_answer(
        &self,
        session_id: &str,
        first: ModelReply,
        tx: &mpsc::Sender<TurnEvent>,
        deadline: Instant,
    ) -> Result<TurnOutcome, TurnError> {
        let mut executable: Vec<ToolCallRequest> = Vec::new();
        let mut unmet: Option<(ToolCallRequest, Vec<String>)> = None;

        for call in first.tool_calls {
            let missing = self.executor.missing_required(&call);
            if missing.is_empty() {
                executable.push(call);
            } else {
                warn!(
                    tool = %call.tool_name,
                    ?missing,
                    "rejecting tool call with unmet required arguments"
                );
                if unmet.is_none() {
                    unmet = Some((call, missing));
                }
            }
        }

        if executable.is_empty() {
            if let Some((call, missing)) = unmet {
                // The directive tells the model to ask instead of guessing;
                // this is the backstop for when it calls anyway.
                let question = self.executor.clarification(&call, &missing);
                return self.stream_text(session_id, question, Vec::new(), tx).await;
            }
            return self
                .stream_text(session_id, first.content, Vec::new(), tx)
                .await;
        }

        // Tool calls take precedence; any scratch text in the first reply is
        // discarded and the answer comes from the post-tool inference.
        self.memory
            .append(
                session_id,
                ConversationTurn::assistant_tool_calls(executable.clone()),
            )
            .await;

        let mut tools_used = Vec::with_capacity(executable.len());
        for call in &executable {
            let outcome = self.executor.dispatch(call).await;
            tools_used.push(outcome.tool_name.clone());
            self.memory
                .append(
                    session_id,
                    ConversationTurn::tool_result(&outcome.tool_name, &outcome.payload),
                )
                .await;
        }

        // SecondInference: full history including the tool results, tool
        // calling disabled, within whatever is left of the turn budget.
        let history = self.memory.history(session_id, None).await;
        let mut messages = Vec::with_capacity(history.turns.len() + 1);
        messages.push(WireMessage::system(SYSTEM_DIRECTIVE));
        messages.extend(history.turns.iter().map(WireMessage::from_turn));

        let mut stream = self
            .with_deadline(deadline, self.engine.complete_stream(&messages))
            .await?;

        let mut response = String::new();
        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                // Budget exhausted: tokens already forwarded stand, nothing
                // partial is persisted.
                Err(_) => return Err(TurnError::Timeout(self.turn_timeout)),
                Ok(None) => break,
                Ok(Some(Ok(token))) => {
                    response.push_str(&token);
                    tx.send(TurnEvent::Token { content: token })
                        .await
                        .map_err(|_| TurnError::Disconnected)?;
                },
                Ok(Some(Err(e))) => return Err(e.into()),
            }
        }

        self.memory
            .append(session_id, ConversationTurn::assistant(response.clone()))
            .await;

        Ok(TurnOutcome {
            response,
            tools_used,
        })
    }

    /// Stream an already-complete text to the caller in chunks and persist it
    /// as the assistant turn.
    async fn stream_text(
        &self,
        session_id: &str,
        text: String,
        tools_used: Vec<String>,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome, TurnError> {
        let mut chunks = std::pin::pin!(chunk_text(text.clone(), None));
        while let Some(chunk) = chunks.next().await {
            tx.send(TurnEvent::Token { content: chunk })
                .await
                .map_err(|_| TurnError::Disconnected)?;
        }

        self.memory
            .append(session_id, ConversationTurn::assistant(text.clone()))
            .await;

        Ok(TurnOutcome {
            response: text,
            tools_used,
        })
    }

    async fn with_deadline<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, InferenceError>>,
    ) -> Result<T, TurnError> {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result.map_err(TurnError::from),
            Err(_) => Err(TurnError::Timeout(self.turn_timeout)),
        }
    }
}
