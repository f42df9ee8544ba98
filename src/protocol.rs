//! Wire protocol for toolbus sessions.
//!
//! Newline-delimited JSON, one `Message` per line. A single tool call is a
//! multi-message exchange correlated by `CallId`: the invoke, any number of
//! progress/log notifications, any number of sequential elicitation/sampling
//! sub-exchanges (correlated by `sub_id` within the call), and exactly one
//! terminal outcome.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

/// Correlates every message belonging to one tool invocation. Allocated by
/// the caller, unique among in-flight calls on one transport.
pub type CallId = u64;

/// Correlates one elicitation/sampling sub-exchange within a call.
pub type SubId = u64;

/// Log notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Caller's resolution of an elicitation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ElicitOutcome {
    /// The caller supplied the requested fields.
    Accept { data: Map<String, Value> },
    /// The caller explicitly refused to answer.
    Decline,
    /// The exchange was abandoned (call cancelled or handler torn down).
    Cancel,
}

/// One entry of the conversation forwarded in a sampling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMessage {
    pub role: String,
    pub content: String,
}

impl SampleMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Generation parameters forwarded in a sampling request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Every message that can cross a toolbus transport, both directions.
/// Closed union; receivers match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Caller starts a tool call.
    #[serde(rename = "invoke")]
    Invoke {
        id: CallId,
        tool: String,
        #[serde(default)]
        args: Map<String, Value>,
    },

    /// Terminal success for a call.
    #[serde(rename = "result")]
    Result { id: CallId, value: Value },

    /// Terminal failure for a call.
    #[serde(rename = "error")]
    Error {
        id: CallId,
        kind: ErrorKind,
        message: String,
    },

    /// Caller asks the serving side to stop a call. Cooperative: a request,
    /// not a forced interrupt.
    #[serde(rename = "cancel")]
    Cancel { id: CallId },

    /// Out-of-band progress notification. `progress` is monotonically
    /// non-decreasing per call.
    #[serde(rename = "progress")]
    Progress {
        id: CallId,
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<f64>,
        message: String,
    },

    /// Out-of-band log notification.
    #[serde(rename = "log")]
    Log {
        id: CallId,
        severity: Severity,
        message: String,
    },

    /// Server pauses the call to ask the caller for structured data.
    #[serde(rename = "elicit_request")]
    ElicitRequest {
        id: CallId,
        sub_id: SubId,
        prompt: String,
        schema: Value,
    },

    /// Caller's answer to an elicitation request.
    #[serde(rename = "elicit_response")]
    ElicitResponse {
        id: CallId,
        sub_id: SubId,
        outcome: ElicitOutcome,
    },

    /// Server pauses the call to ask the caller for generated text.
    #[serde(rename = "sample_request")]
    SampleRequest {
        id: CallId,
        sub_id: SubId,
        messages: Vec<SampleMessage>,
        #[serde(default)]
        params: SampleParams,
    },

    /// Caller's answer to a sampling request: generated text or a failure.
    #[serde(rename = "sample_response")]
    SampleResponse {
        id: CallId,
        sub_id: SubId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Liveness probe.
    #[serde(rename = "ping")]
    Ping { id: CallId },

    /// Answer to a liveness probe.
    #[serde(rename = "pong")]
    Pong { id: CallId },
}

impl Message {
    /// The CallId this message belongs to.
    pub fn call_id(&self) -> CallId {
        match self {
            Message::Invoke { id, .. }
            | Message::Result { id, .. }
            | Message::Error { id, .. }
            | Message::Cancel { id }
            | Message::Progress { id, .. }
            | Message::Log { id, .. }
            | Message::ElicitRequest { id, .. }
            | Message::ElicitResponse { id, .. }
            | Message::SampleRequest { id, .. }
            | Message::SampleResponse { id, .. }
            | Message::Ping { id }
            | Message::Pong { id } => *id,
        }
    }
}

/// Encode a message as a newline-terminated JSON string.
pub fn encode_message(msg: &Message) -> String {
    let mut json = serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string());
    json.push('\n');
    json
}

/// Decode a message from a single JSON line.
pub fn decode_message(line: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(line.trim())
}
