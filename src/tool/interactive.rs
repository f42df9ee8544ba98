//! Tools that exercise the interactive half of the protocol: progress
//! streaming, elicitation, and sampling.

use super::{require_str, Tool};
use crate::server::{CallContext, Elicited};
use crate::protocol::{SampleMessage, SampleParams};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct AskForNameTool;

#[async_trait]
impl Tool for AskForNameTool {
    fn name(&self) -> &str {
        "ask_for_name"
    }

    fn description(&self) -> &str {
        "Ask for the user's name using elicitation"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Map<String, Value>, ctx: CallContext) -> Result<Value> {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string" }
            }
        });
        match ctx.elicit("What is your name?", schema).await? {
            Elicited::Accepted(data) => {
                let name = data
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("elicitation answer missing 'name'"))?;
                Ok(json!(format!("Hello, {}!", name)))
            }
            Elicited::Declined => Ok(json!("No name provided.")),
        }
    }
}

pub struct ProgressTool;

#[async_trait]
impl Tool for ProgressTool {
    fn name(&self) -> &str {
        "progress_tool"
    }

    fn description(&self) -> &str {
        "Tool that reports progress"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Map<String, Value>, ctx: CallContext) -> Result<Value> {
        let total = 3;
        for step in 1..=total {
            let percent = step as f64 / total as f64 * 100.0;
            ctx.progress(
                step as f64,
                Some(total as f64),
                format!("{:.2}% complete", percent),
            )
            .await?;
        }
        Ok(json!(100))
    }
}

pub struct SimpleSampleTool;

#[async_trait]
impl Tool for SimpleSampleTool {
    fn name(&self) -> &str {
        "simple_sample"
    }

    fn description(&self) -> &str {
        "Forward a message to the caller's sampling handler"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["message"],
            "properties": {
                "message": { "type": "string", "description": "Message to sample from" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, ctx: CallContext) -> Result<Value> {
        let message = require_str(&args, "message")?;
        let text = ctx
            .sample(vec![SampleMessage::user(message)], SampleParams::default())
            .await?;
        Ok(json!(text))
    }
}
