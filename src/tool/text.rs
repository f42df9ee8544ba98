use super::{require_str, Tool};
use crate::server::CallContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct GreetTool;

#[async_trait]
impl Tool for GreetTool {
    fn name(&self) -> &str {
        "greet"
    }

    fn description(&self) -> &str {
        "Greet someone by name"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string", "description": "Name to greet" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let name = require_str(&args, "name")?;
        Ok(json!(format!("Hello, {}!", name)))
    }
}

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back a message"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["message"],
            "properties": {
                "message": { "type": "string", "description": "Message to echo back" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let message = require_str(&args, "message")?;
        Ok(json!(message))
    }
}
