//! Conversation data model and the SSE wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured tool-call request produced by the inference engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// One immutable message in a conversation.
///
/// Turns are created when content is finalized and never mutated afterwards;
/// corrections are modeled as new turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl ConversationTurn {
    fn next_id() -> String {
        format!("msg_{}", Uuid::new_v4().simple())
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Self::next_id(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requested tool execution. Any scratch text the
    /// model produced alongside the calls is discarded.
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        let mut turn = Self::new(Role::Assistant, "");
        turn.tool_calls = Some(calls);
        turn
    }

    /// Tool result turn carrying the serialized payload of one invocation.
    pub fn tool_result(tool_name: &str, payload: &Value) -> Self {
        let mut turn = Self::new(Role::Tool, payload.to_string());
        turn.tool_call_id = Some(tool_name.to_string());
        turn.tool_name = Some(tool_name.to_string());
        turn
    }
}

/// A semantic-index hit selected for context injection. Rendered as a
/// synthetic system turn for a single inference call and never persisted.
#[derive(Debug, Clone)]
pub struct RagContextItem {
    pub content: String,
    pub similarity: f64,
    pub original_timestamp: DateTime<Utc>,
}

impl RagContextItem {
    pub fn into_context_turn(self) -> ConversationTurn {
        ConversationTurn {
            id: format!("rag_{}", Uuid::new_v4().simple()),
            role: Role::System,
            content: format!("[CONTEXT] {}", self.content),
            created_at: self.original_timestamp,
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        }
    }
}

/// Inbound chat request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Opaque caller identity attached by the transport layer.
    #[serde(default)]
    pub user: Option<String>,
}

/// One frame of the chat event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnEvent {
    Token {
        content: String,
    },
    Complete {
        response: String,
        #[serde(rename = "toolsUsed")]
        tools_used: Vec<String>,
        #[serde(rename = "sessionId")]
        session_id: String,
        metadata: TurnMetadata,
    },
    Error {
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnMetadata {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_roundtrip() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(role, Role::Tool);
    }

    #[test]
    fn test_turn_serde_roundtrip() {
        let turn = ConversationTurn::tool_result("getGridData", &json!({"voltage": "121.3 V"}));
        let encoded = serde_json::to_string(&turn).unwrap();
        let decoded: ConversationTurn = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.role, Role::Tool);
        assert_eq!(decoded.tool_call_id.as_deref(), Some("getGridData"));
        assert_eq!(decoded.tool_name.as_deref(), Some("getGridData"));
        assert_eq!(decoded.content, turn.content);
        assert_eq!(decoded.id, turn.id);
    }

    #[test]
    fn test_plain_turn_omits_tool_fields() {
        let turn = ConversationTurn::user("hello");
        let value = serde_json::to_value(&turn).unwrap();

        assert!(value.get("tool_call_id").is_none());
        assert!(value.get("tool_calls").is_none());
        assert_eq!(value["role"], "user");
    }

    #[test]
    fn test_token_event_shape() {
        let event = TurnEvent::Token {
            content: "hi".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "token", "content": "hi"}));
    }

    #[test]
    fn test_complete_event_shape() {
        let event = TurnEvent::Complete {
            response: "done".to_string(),
            tools_used: vec!["getGridData".to_string()],
            session_id: "s1".to_string(),
            metadata: TurnMetadata {
                timestamp: Utc::now(),
                success: true,
            },
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "complete");
        assert_eq!(value["toolsUsed"][0], "getGridData");
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["metadata"]["success"], true);
    }

    #[test]
    fn test_chat_request_camel_case() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "sessionId": "abc"}"#).unwrap();
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert!(request.user.is_none());
    }

    #[test]
    fn test_rag_item_context_turn() {
        let stamp = Utc::now();
        let item = RagContextItem {
            content: "voltage was nominal yesterday".to_string(),
            similarity: 0.7,
            original_timestamp: stamp,
        };

        let turn = item.into_context_turn();
        assert_eq!(turn.role, Role::System);
        assert!(turn.id.starts_with("rag_"));
        assert_eq!(turn.content, "[CONTEXT] voltage was nominal yesterday");
        assert_eq!(turn.created_at, stamp);
    }
}
