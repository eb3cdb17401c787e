//! Client for the language-model inference capability.
//!
//! The contract has two calls: a non-streaming completion that may answer
//! with structured tool-call requests, and a token stream for the final
//! natural-language answer. [`OllamaEngine`] implements both against an
//! Ollama-compatible `/api/chat` endpoint.

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::core::config::InferenceConfig;
use crate::core::tools::ToolSchema;
use crate::models::chat::{ConversationTurn, ToolCallRequest};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Transport(String),

    #[error("inference stream failed: {0}")]
    Stream(String),

    #[error("unexpected inference payload: {0}")]
    Protocol(String),
}

/// Outcome of the non-streaming call: free text, tool-call requests, or both.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, InferenceError>> + Send>>;

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// One-shot completion with the tool catalog attached; the reply decides
    /// whether tools must run before an answer can be produced.
    async fn complete(
        &self,
        messages: &[WireMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelReply, InferenceError>;

    /// Streaming completion with tool calling disabled.
    async fn complete_stream(&self, messages: &[WireMessage])
    -> Result<TokenStream, InferenceError>;
}

/// Message shape on the inference wire.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn from_turn(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| WireToolCall {
                        function: WireFunction {
                            name: call.tool_name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect()
            }),
        }
    }
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn parse_chat_line(line: &str) -> Result<ChatResponse, InferenceError> {
    serde_json::from_str(line).map_err(|e| InferenceError::Protocol(e.to_string()))
}

pub struct OllamaEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OllamaEngine {
    pub fn new(config: &InferenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn post_chat(
        &self,
        messages: &[WireMessage],
        tools: Option<&[ToolSchema]>,
        stream: bool,
    ) -> Result<reqwest::Response, InferenceError> {
        let payload = ChatPayload {
            model: &self.model,
            messages,
            stream,
            tools,
            options: ChatOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InferenceError::Transport(format!(
                "inference engine returned HTTP {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn complete(
        &self,
        messages: &[WireMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelReply, InferenceError> {
        let response = self.post_chat(messages, tools, false).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Protocol(e.to_string()))?;

        let message = body.message.unwrap_or_default();
        debug!(
            content_len = message.content.len(),
            tool_calls = message.tool_calls.len(),
            "inference reply"
        );

        Ok(ModelReply {
            content: message.content,
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|call| ToolCallRequest {
                    tool_name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[WireMessage],
    ) -> Result<TokenStream, InferenceError> {
        let response = self.post_chat(messages, None, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(InferenceError::Stream(e.to_string()));
                        return;
                    },
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }

                    match parse_chat_line(&line) {
                        Ok(parsed) => {
                            if let Some(message) = parsed.message {
                                if !message.content.is_empty() {
                                    yield Ok(message.content);
                                }
                            }
                            if parsed.done {
                                return;
                            }
                        },
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
