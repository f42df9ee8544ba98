//! Error taxonomy for tool calls.
//!
//! `CallError` is what `Session::await_call` hands back: a discriminated
//! outcome where cancellation is distinguishable from execution failure.
//! `ErrorKind` is the wire-level tag carried by `Message::Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::CallId;

/// Failure modes of a tool call, client- or server-originated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The CallId was never invoked on this session, or was already awaited.
    #[error("unknown call id {0}")]
    UnknownCallId(CallId),

    /// No tool registered under the requested name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments rejected before the tool body ran.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool body failed; the message preserves the tool's error text.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// The transport channel closed; terminates every pending call on it.
    #[error("transport channel closed")]
    Transport,

    /// The call was cancelled before reaching a result.
    #[error("call cancelled")]
    Cancelled,

    /// The caller declined an elicitation the tool chose not to tolerate.
    #[error("elicitation declined")]
    ExchangeDeclined,

    /// A caller-side deadline elapsed; the call was cancelled on the way out.
    #[error("call deadline elapsed")]
    ExchangeTimeout,
}

/// Wire-level error discriminant, carried as a snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCallId,
    ToolNotFound,
    InvalidArguments,
    Execution,
    Transport,
    Cancelled,
    Declined,
    Timeout,
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::UnknownCallId(_) => ErrorKind::UnknownCallId,
            CallError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            CallError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            CallError::ToolExecution(_) => ErrorKind::Execution,
            CallError::Transport => ErrorKind::Transport,
            CallError::Cancelled => ErrorKind::Cancelled,
            CallError::ExchangeDeclined => ErrorKind::Declined,
            CallError::ExchangeTimeout => ErrorKind::Timeout,
        }
    }

    /// The payload string for `Message::Error`, without the Display prefix,
    /// so decoding on the far side does not stack prefixes.
    pub(crate) fn wire_message(&self) -> String {
        match self {
            CallError::UnknownCallId(id) => id.to_string(),
            CallError::ToolNotFound(name) => name.clone(),
            CallError::InvalidArguments(msg)
            | CallError::ToolExecution(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild a `CallError` from a wire `Error { id, kind, message }`.
    pub(crate) fn from_wire(id: CallId, kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::UnknownCallId => CallError::UnknownCallId(id),
            ErrorKind::ToolNotFound => CallError::ToolNotFound(message),
            ErrorKind::InvalidArguments => CallError::InvalidArguments(message),
            ErrorKind::Execution => CallError::ToolExecution(message),
            ErrorKind::Transport => CallError::Transport,
            ErrorKind::Cancelled => CallError::Cancelled,
            ErrorKind::Declined => CallError::ExchangeDeclined,
            ErrorKind::Timeout => CallError::ExchangeTimeout,
        }
    }
}
