use super::{require_str, Tool};
use crate::config::config;
use crate::logging;
use crate::retry::{retry, RequestError, RetryPolicy};
use crate::server::CallContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct SlackNotifyTool {
    client: reqwest::Client,
}

impl SlackNotifyTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for SlackNotifyTool {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::timeout(err.to_string())
    } else {
        RequestError::transport(err.to_string())
    }
}

#[async_trait]
impl Tool for SlackNotifyTool {
    fn name(&self) -> &str {
        "slack_notify"
    }

    fn description(&self) -> &str {
        "Send a message to slack"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["message"],
            "properties": {
                "message": { "type": "string", "description": "Message to send" }
            }
        })
    }

    async fn execute(&self, args: Map<String, Value>, _ctx: CallContext) -> Result<Value> {
        let message = require_str(&args, "message")?;

        match &config().notify.webhook_url {
            Some(url) => {
                let policy = RetryPolicy::from_config();
                let client = self.client.clone();
                let body = json!({ "text": message });
                retry(&policy, || {
                    let client = client.clone();
                    let url = url.clone();
                    let body = body.clone();
                    async move {
                        let resp = client
                            .post(&url)
                            .json(&body)
                            .send()
                            .await
                            .map_err(classify)?;
                        let status = resp.status();
                        if status.is_success() {
                            Ok(())
                        } else {
                            Err(RequestError::status(
                                status.as_u16(),
                                format!("webhook returned {}", status),
                            ))
                        }
                    }
                })
                .await
                .map_err(|e| anyhow::anyhow!("notification delivery failed: {}", e))?;
            }
            None => {
                // No webhook configured: log-only delivery, same acknowledgement.
                logging::info(&format!("notify (no webhook configured): {}", message));
            }
        }

        Ok(json!("Notification Sent!"))
    }
}
