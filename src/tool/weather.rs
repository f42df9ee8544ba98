use super::{require_str, Tool};
use crate::server::CallContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather_tool"
    }

    fn description(&self) -> &str {
        "Get weather information for a city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["city"],
            "properties": {
                "city": { "type": "string", "description": "City name" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let city = require_str(&args, "city")?;
        let report = match city {
            "Hyderabad" => "Sunny, 32°C".to_string(),
            "London" => "Rainy, 15°C".to_string(),
            "Tokyo" => "Cloudy, 22°C".to_string(),
            other => format!("Weather data not available for {}", other),
        };
        Ok(json!(report))
    }
}
