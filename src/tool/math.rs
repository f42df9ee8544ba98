use super::{require_i64, Tool};
use crate::server::CallContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two numbers"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "a": { "type": "integer", "description": "First number" },
                "b": { "type": "integer", "description": "Second number" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let a = require_i64(&args, "a")?;
        let b = require_i64(&args, "b")?;
        Ok(json!(a + b))
    }
}

pub struct MultiplyTool;

#[async_trait]
impl Tool for MultiplyTool {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiply two numbers"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "a": { "type": "integer", "description": "First number" },
                "b": { "type": "integer", "description": "Second number" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let a = require_i64(&args, "a")?;
        let b = require_i64(&args, "b")?;
        Ok(json!(a * b))
    }
}
