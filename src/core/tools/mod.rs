//! Tool catalog and executor.
//!
//! Each tool is a stateless function over a validated argument map; calls are
//! independent, safe to retry, and individually failable. The executor checks
//! every requested call against the declared parameter schema before dispatch
//! and bounds each invocation with a timeout, folding failures into the tool
//! turn payload instead of aborting the turn.

mod company;
mod grid_data;
mod weather;

pub use company::CompanyInfoTool;
pub use grid_data::GridDataTool;
pub use weather::WeatherTool;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::chat::ToolCallRequest;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// A callable capability exposed to the inference engine.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON-schema object describing the argument map
    /// (`{"type": "object", "properties": {...}, "required": [...]}`).
    fn parameters(&self) -> Value;

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;

    /// Question to ask the caller when required arguments are missing.
    fn clarification(&self, missing: &[String]) -> String {
        format!(
            "I need a value for {} before I can run {}. Could you provide it?",
            missing.join(", "),
            self.name()
        )
    }
}

/// Wire shape of a tool declaration, as handed to the inference engine.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of available tools, fixed at startup.
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCatalog {
    /// Build the catalog. Duplicate tool names are a configuration error and
    /// abort startup.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> anyhow::Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name()) {
                anyhow::bail!("duplicate tool registered: {}", tool.name());
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| ToolSchema {
                tool_type: "function".to_string(),
                function: FunctionSchema {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                },
            })
            .collect()
    }
}

/// Result of one dispatched call: the payload is either the tool's output or
/// a folded `{"error": ...}` object.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub payload: Value,
}

pub struct ToolExecutor {
    catalog: ToolCatalog,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(catalog: ToolCatalog, call_timeout: Duration) -> Self {
        Self {
            catalog,
            call_timeout,
        }
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.catalog.schemas()
    }

    /// Required parameters the request failed to supply. Empty for unknown
    /// tools; those fail validation on their own.
    pub fn missing_required(&self, call: &ToolCallRequest) -> Vec<String> {
        let Some(tool) = self.catalog.get(&call.tool_name) else {
            return Vec::new();
        };

        let params = tool.parameters();
        params["required"]
            .as_array()
            .map(|required| {
                required
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|name| !call.arguments.contains_key(*name))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate a requested call against the declared schema: the tool must
    /// exist, every required argument must be present, and no unknown
    /// argument names are accepted.
    pub fn validate(&self, call: &ToolCallRequest) -> Result<(), ToolError> {
        let tool = self
            .catalog
            .get(&call.tool_name)
            .ok_or_else(|| ToolError::NotFound(call.tool_name.clone()))?;

        let params = tool.parameters();
        let missing = self.missing_required(call);
        if !missing.is_empty() {
            return Err(ToolError::InvalidArgument(format!(
                "missing required argument(s) {} for {}",
                missing.join(", "),
                call.tool_name
            )));
        }

        if let Some(properties) = params["properties"].as_object() {
            for key in call.arguments.keys() {
                if !properties.contains_key(key) {
                    return Err(ToolError::InvalidArgument(format!(
                        "unknown argument `{key}` for {}",
                        call.tool_name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Clarifying question for a call rejected over missing arguments.
    pub fn clarification(&self, call: &ToolCallRequest, missing: &[String]) -> String {
        match self.catalog.get(&call.tool_name) {
            Some(tool) => tool.clarification(missing),
            None => "I need a bit more information before I can help with that.".to_string(),
        }
    }

    /// Run one call to completion. Never fails: validation errors, tool
    /// errors and timeouts all come back as an error payload.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolOutcome {
        let payload = match self.validate(call).map(|_| self.catalog.get(&call.tool_name)) {
            Err(e) => {
                warn!(tool = %call.tool_name, error = %e, "rejected tool call");
                json!({"error": e.to_string()})
            },
            Ok(None) => {
                json!({"error": ToolError::NotFound(call.tool_name.clone()).to_string()})
            },
            Ok(Some(tool)) => {
                info!(tool = %call.tool_name, "executing tool");
                match tokio::time::timeout(self.call_timeout, tool.invoke(&call.arguments)).await
                {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        warn!(tool = %call.tool_name, error = %e, "tool execution failed");
                        json!({"error": e.to_string()})
                    },
                    Err(_) => {
                        warn!(
                            tool = %call.tool_name,
                            timeout = ?self.call_timeout,
                            "tool call timed out"
                        );
                        json!({
                            "error": format!(
                                "upstream unavailable: {} timed out after {:?}",
                                call.tool_name, self.call_timeout
                            )
                        })
                    },
                }
            },
        };

        ToolOutcome {
            tool_name: call.tool_name.clone(),
            payload,
        }
    }
}
