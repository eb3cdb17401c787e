//! Real-time grid telemetry lookup.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{Tool, ToolError};

pub struct GridDataTool {
    client: reqwest::Client,
    base_url: String,
}

impl GridDataTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/data/", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Tool for GridDataTool {
    fn name(&self) -> &'static str {
        "getGridData"
    }

    fn description(&self) -> &'static str {
        "Get current real-time energy grid data including voltage, demand, frequency, and system alerts. Doesn't need any location information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        debug!("fetching grid telemetry");

        let response = self
            .client
            .get(self.endpoint())
            .send()
            .await
            .map_err(|e| {
                ToolError::UpstreamUnavailable(format!("failed to fetch grid data: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ToolError::UpstreamUnavailable(format!(
                "grid data service returned HTTP {}",
                response.status()
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            ToolError::UpstreamUnavailable(format!("malformed grid data payload: {e}"))
        })
    }
}
