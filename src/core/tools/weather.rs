//! Weather lookup for an explicitly named location.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{Tool, ToolError};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct WeatherTool {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl WeatherTool {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn fetch(&self, key: &str, location: &str) -> Result<Value, ToolError> {
        let response = self
            .client
            .get(OPENWEATHER_URL)
            .query(&[("q", location), ("appid", key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| {
                ToolError::UpstreamUnavailable(format!("failed to fetch weather data: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ToolError::UpstreamUnavailable(format!(
                "weather service returned HTTP {}",
                response.status()
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            ToolError::UpstreamUnavailable(format!("malformed weather payload: {e}"))
        })
    }

    /// Demo reading used when no API key is configured.
    fn simulated(location: &str) -> Value {
        let mut rng = rand::thread_rng();
        let conditions = ["Clear", "Clouds", "Rain", "Snow"];

        json!({
            "name": location,
            "main": {
                "temp": rng.gen_range(15..35),
                "humidity": rng.gen_range(40..80),
                "pressure": rng.gen_range(1000..1050)
            },
            "weather": [{
                "main": conditions[rng.gen_range(0..conditions.len())],
                "description": "simulated weather data"
            }],
            "wind": { "speed": rng.gen_range(0..15) },
            "visibility": rng.gen_range(5000..15000)
        })
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &'static str {
        "getWeather"
    }

    fn description(&self) -> &'static str {
        "Get current weather information for a specific location. Needs location information and returns weather information for the specified location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city or location name"
                }
            },
            "required": ["location"]
        })
    }

    fn clarification(&self, _missing: &[String]) -> String {
        "I need to know which city or location you'd like the weather for. Please specify a location.".to_string()
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArgument("location parameter is required".to_string())
            })?;

        debug!(location, "fetching weather data");

        match &self.api_key {
            Some(key) => self.fetch(key, location).await,
            None => Ok(Self::simulated(location)),
        }
    }
}
