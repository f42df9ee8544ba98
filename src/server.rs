//! Server endpoint: executes tool calls and drives their sub-exchanges.
//!
//! One `Server` owns a `Registry` and serves one transport at a time. Each
//! inbound invoke spawns a tool task; the task's `CallContext` is both its
//! identity on the wire and its suspension points. Elicitation and sampling
//! requests park the tool body on a oneshot that the routing loop resolves
//! when the caller's response (or a cancellation) arrives, so a suspended
//! call never pins a worker thread and other calls keep flowing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use crate::config::config;
use crate::error::CallError;
use crate::logging::{self, LogContext};
use crate::protocol::{
    CallId, ElicitOutcome, Message, SampleMessage, SampleParams, Severity, SubId,
};
use crate::state::CallState;
use crate::tool::Registry;
use crate::transport::Transport;

/// Resolution of one elicitation exchange, as seen by the tool body.
#[derive(Debug, Clone, PartialEq)]
pub enum Elicited {
    /// The caller supplied the requested fields.
    Accepted(Map<String, Value>),
    /// The caller refused; the tool decides what that means.
    Declined,
}

/// What the routing loop feeds back into a suspended sub-exchange.
#[derive(Debug)]
enum SubResponse {
    Elicit(ElicitOutcome),
    Sample {
        text: Option<String>,
        error: Option<String>,
    },
    Cancelled,
}

/// Shared bookkeeping for one in-flight call. The pieces are individually
/// shared between the routing loop and the tool task; the state cell is the
/// single arbiter of who gets to make the call terminal.
#[derive(Clone)]
struct ActiveCall {
    state: Arc<Mutex<CallState>>,
    cancelled: Arc<AtomicBool>,
    subs: Arc<Mutex<HashMap<SubId, oneshot::Sender<SubResponse>>>>,
}

impl ActiveCall {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CallState::Running)),
            cancelled: Arc::new(AtomicBool::new(false)),
            subs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

type CallTable = Arc<Mutex<HashMap<CallId, ActiveCall>>>;

/// Execution context handed to every tool body.
#[derive(Clone)]
pub struct CallContext {
    call_id: CallId,
    out: mpsc::Sender<Message>,
    call: ActiveCall,
    next_sub: Arc<AtomicU64>,
    last_progress: Arc<Mutex<f64>>,
}

impl CallContext {
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Whether a cancellation request has landed for this call. Cooperative:
    /// tool bodies observe it at their next suspension point, or check it
    /// explicitly between long non-async sections.
    pub fn is_cancelled(&self) -> bool {
        self.call.cancelled.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CallError::Cancelled.into());
        }
        Ok(())
    }

    /// Emit a progress notification. Values must be non-decreasing per call;
    /// a regression is an error, not a tolerated quirk.
    pub async fn progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: impl Into<String>,
    ) -> Result<()> {
        self.ensure_live()?;
        {
            let mut last = self.last_progress.lock().unwrap();
            if progress < *last {
                bail!(
                    "progress must be non-decreasing (got {} after {})",
                    progress,
                    *last
                );
            }
            *last = progress;
        }
        self.out
            .send(Message::Progress {
                id: self.call_id,
                progress,
                total,
                message: message.into(),
            })
            .await
            .map_err(|_| CallError::Transport)?;
        Ok(())
    }

    /// Emit a log notification.
    pub async fn log(&self, severity: Severity, message: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        self.out
            .send(Message::Log {
                id: self.call_id,
                severity,
                message: message.into(),
            })
            .await
            .map_err(|_| CallError::Transport)?;
        Ok(())
    }

    /// Suspend the call to ask the caller for structured data matching
    /// `schema`. Resumes when the caller answers; a cancellation mid-flight
    /// surfaces as `CallError::Cancelled` so the body unwinds via `?`.
    pub async fn elicit(&self, prompt: impl Into<String>, schema: Value) -> Result<Elicited> {
        let (sub_id, rx) = self.open_sub(CallState::AwaitingElicitation)?;
        let sent = self
            .out
            .send(Message::ElicitRequest {
                id: self.call_id,
                sub_id,
                prompt: prompt.into(),
                schema,
            })
            .await;
        if sent.is_err() {
            self.abandon_sub(sub_id);
            return Err(CallError::Transport.into());
        }
        let resp = match rx.await {
            Ok(resp) => resp,
            Err(_) => {
                self.resume_running();
                return Err(CallError::Transport.into());
            }
        };
        self.resume_running();
        match resp {
            SubResponse::Elicit(ElicitOutcome::Accept { data }) => Ok(Elicited::Accepted(data)),
            SubResponse::Elicit(ElicitOutcome::Decline) => Ok(Elicited::Declined),
            SubResponse::Elicit(ElicitOutcome::Cancel) | SubResponse::Cancelled => {
                Err(CallError::Cancelled.into())
            }
            SubResponse::Sample { .. } => bail!("mismatched response for elicitation exchange"),
        }
    }

    /// Suspend the call to ask the caller for generated text.
    pub async fn sample(
        &self,
        messages: Vec<SampleMessage>,
        params: SampleParams,
    ) -> Result<String> {
        let (sub_id, rx) = self.open_sub(CallState::AwaitingSampling)?;
        let sent = self
            .out
            .send(Message::SampleRequest {
                id: self.call_id,
                sub_id,
                messages,
                params,
            })
            .await;
        if sent.is_err() {
            self.abandon_sub(sub_id);
            return Err(CallError::Transport.into());
        }
        let resp = match rx.await {
            Ok(resp) => resp,
            Err(_) => {
                self.resume_running();
                return Err(CallError::Transport.into());
            }
        };
        self.resume_running();
        match resp {
            SubResponse::Sample {
                text: Some(text), ..
            } => Ok(text),
            SubResponse::Sample {
                error: Some(error), ..
            } => bail!("sampling failed: {}", error),
            SubResponse::Sample { .. } => bail!("empty sampling response"),
            SubResponse::Cancelled | SubResponse::Elicit(ElicitOutcome::Cancel) => {
                Err(CallError::Cancelled.into())
            }
            SubResponse::Elicit(_) => bail!("mismatched response for sampling exchange"),
        }
    }

    /// Allocate a sub-exchange id and park slot. Sub-exchanges are
    /// sequential per call: opening a second while one is outstanding is an
    /// error in the tool body.
    fn open_sub(
        &self,
        awaiting: CallState,
    ) -> Result<(SubId, oneshot::Receiver<SubResponse>)> {
        self.ensure_live()?;
        let sub_id = self.next_sub.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut subs = self.call.subs.lock().unwrap();
            if !subs.is_empty() {
                bail!("a sub-exchange is already outstanding for this call");
            }
            subs.insert(sub_id, tx);
        }
        {
            let mut state = self.call.state.lock().unwrap();
            if state.advance(awaiting).is_err() {
                // A cancel landed between the liveness check and here.
                drop(state);
                self.call.subs.lock().unwrap().remove(&sub_id);
                return Err(CallError::Cancelled.into());
            }
        }
        Ok((sub_id, rx))
    }

    fn abandon_sub(&self, sub_id: SubId) {
        self.call.subs.lock().unwrap().remove(&sub_id);
        self.resume_running();
    }

    fn resume_running(&self) {
        let mut state = self.call.state.lock().unwrap();
        if state.is_awaiting() {
            let _ = state.advance(CallState::Running);
        }
    }
}

/// Build a context wired to nothing but `out`, for exercising tool bodies
/// in unit tests without a serving loop.
#[cfg(test)]
pub(crate) fn test_call_context(out: mpsc::Sender<Message>) -> CallContext {
    CallContext {
        call_id: 1,
        out,
        call: ActiveCall::new(),
        next_sub: Arc::new(AtomicU64::new(1)),
        last_progress: Arc::new(Mutex::new(0.0)),
    }
}

/// Serves one registry over one transport.
pub struct Server {
    registry: Arc<Registry>,
    session_id: String,
}

impl Server {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            session_id: crate::id::new_id("server"),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route inbound messages until the peer closes its send half. Each
    /// message kind has exactly one home; anything a server should never
    /// receive is logged and dropped.
    pub async fn serve(&self, transport: Transport) -> Result<()> {
        let (out, mut inbound) = transport.into_split();
        let calls: CallTable = Arc::new(Mutex::new(HashMap::new()));

        logging::set_context(LogContext {
            endpoint: Some("server".to_string()),
            session: Some(self.session_id.clone()),
            call: None,
        });
        logging::info(&format!(
            "'{}' serving {} tool(s)",
            config().server.name,
            self.registry.definitions().len()
        ));

        while let Some(msg) = inbound.recv().await {
            match msg {
                Message::Invoke { id, tool, args } => {
                    self.start_call(&calls, &out, id, tool, args);
                }
                Message::Cancel { id } => cancel_call(&calls, id),
                Message::ElicitResponse { id, sub_id, outcome } => {
                    resolve_sub(&calls, id, sub_id, SubResponse::Elicit(outcome));
                }
                Message::SampleResponse {
                    id,
                    sub_id,
                    text,
                    error,
                } => {
                    resolve_sub(&calls, id, sub_id, SubResponse::Sample { text, error });
                }
                Message::Ping { id } => {
                    let _ = out.send(Message::Pong { id }).await;
                }
                other => {
                    logging::warn(&format!(
                        "Unexpected message on server side: {:?}",
                        other
                    ));
                }
            }
        }

        // Peer gone; ask the stragglers to stop so resources release.
        let ids: Vec<CallId> = calls.lock().unwrap().keys().copied().collect();
        for id in ids {
            cancel_call(&calls, id);
        }
        logging::info("Transport closed, server loop exiting");
        Ok(())
    }

    fn start_call(
        &self,
        calls: &CallTable,
        out: &mpsc::Sender<Message>,
        id: CallId,
        tool: String,
        args: Map<String, Value>,
    ) {
        let call = ActiveCall::new();
        {
            let mut table = calls.lock().unwrap();
            if table.contains_key(&id) {
                // A CallId is only reusable after its call went terminal.
                drop(table);
                let err =
                    CallError::InvalidArguments(format!("call id {} is already in flight", id));
                let out = out.clone();
                tokio::spawn(async move {
                    let _ = out
                        .send(Message::Error {
                            id,
                            kind: err.kind(),
                            message: err.wire_message(),
                        })
                        .await;
                });
                return;
            }
            table.insert(id, call.clone());
        }

        let ctx = CallContext {
            call_id: id,
            out: out.clone(),
            call: call.clone(),
            next_sub: Arc::new(AtomicU64::new(1)),
            last_progress: Arc::new(Mutex::new(0.0)),
        };
        let registry = Arc::clone(&self.registry);
        let calls = Arc::clone(calls);
        let out = out.clone();
        let session = self.session_id.clone();

        tokio::spawn(async move {
            logging::set_context(LogContext {
                endpoint: Some("server".to_string()),
                session: Some(session),
                call: Some(id),
            });
            logging::debug(&format!("Executing tool '{}'", tool));

            let outcome = registry.execute(&tool, args, ctx).await;
            calls.lock().unwrap().remove(&id);

            // The state cell arbitrates the terminal: if a cancel got there
            // first, the caller already resolved the call locally and no
            // terminal message goes on the wire.
            let finished = {
                let mut state = call.state.lock().unwrap();
                if state.is_terminal() {
                    false
                } else {
                    let to = if outcome.is_ok() {
                        CallState::Succeeded
                    } else {
                        CallState::Failed
                    };
                    state.advance(to).is_ok()
                }
            };
            if !finished {
                logging::debug(&format!("Call {} ended after cancel, no terminal sent", id));
                logging::clear_context();
                return;
            }

            let msg = match outcome {
                Ok(value) => Message::Result { id, value },
                Err(err) => {
                    logging::warn(&format!("Tool '{}' failed: {}", tool, err));
                    Message::Error {
                        id,
                        kind: err.kind(),
                        message: err.wire_message(),
                    }
                }
            };
            let _ = out.send(msg).await;
            logging::clear_context();
        });
    }
}

fn cancel_call(calls: &CallTable, id: CallId) {
    let call = calls.lock().unwrap().get(&id).cloned();
    let Some(call) = call else {
        logging::debug(&format!("Cancel for unknown call {}", id));
        return;
    };

    call.cancelled.store(true, Ordering::SeqCst);
    {
        let mut state = call.state.lock().unwrap();
        if !state.is_terminal() {
            let _ = state.advance(CallState::Cancelled);
        }
    }
    // Resolve outstanding sub-exchanges as cancelled without waiting on the
    // caller; the suspended tool body unwinds from its await point.
    let pending: Vec<(SubId, oneshot::Sender<SubResponse>)> =
        call.subs.lock().unwrap().drain().collect();
    for (_, tx) in pending {
        let _ = tx.send(SubResponse::Cancelled);
    }
}

fn resolve_sub(calls: &CallTable, id: CallId, sub_id: SubId, resp: SubResponse) {
    let tx = calls
        .lock()
        .unwrap()
        .get(&id)
        .and_then(|call| call.subs.lock().unwrap().remove(&sub_id));
    match tx {
        Some(tx) => {
            let _ = tx.send(resp);
        }
        None => {
            logging::debug(&format!(
                "Response for unknown sub-exchange {}/{}",
                id, sub_id
            ));
        }
    }
}
