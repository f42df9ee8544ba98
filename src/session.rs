//! Client session: multiplexes concurrent tool calls over one transport.
//!
//! `invoke` registers a pending call and returns its CallId immediately; the
//! outcome is retrieved with `await_call`, which suspends cooperatively on
//! the call's result slot. A router task owns the inbound half of the
//! transport and is the only writer into the correlation table's result
//! slots: terminals fill them, progress/log events go to the dispatcher, and
//! elicitation/sampling requests run the session's handlers off the router
//! so a slow handler never stalls other calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::dispatch::{CallEvent, Dispatcher, EventHandler};
use crate::error::CallError;
use crate::logging::{self, LogContext};
use crate::protocol::{CallId, ElicitOutcome, Message, SampleMessage, SampleParams, SubId};
use crate::transport::Transport;

/// A mid-call request for structured data, as seen by the session handler.
#[derive(Debug, Clone)]
pub struct ElicitPrompt {
    pub prompt: String,
    /// Shape of the expected answer: named, typed fields.
    pub schema: Value,
}

/// Answers the server's mid-call questions. At most one per session.
#[async_trait]
pub trait ElicitHandler: Send + Sync {
    async fn handle(&self, request: ElicitPrompt) -> ElicitOutcome;
}

/// A mid-call request for generated text.
#[derive(Debug, Clone)]
pub struct SampleTask {
    pub messages: Vec<SampleMessage>,
    pub params: SampleParams,
}

/// Produces generated text for the server's sampling requests. At most one
/// per session.
#[async_trait]
pub trait SampleHandler: Send + Sync {
    async fn handle(&self, request: SampleTask) -> anyhow::Result<String>;
}

/// Correlation table entry for one in-flight call. The result slot is a
/// oneshot: the router (or a local cancel) writes it once, `await_call`
/// reads it once, and the entry leaves the table when the call is awaited.
struct PendingCall {
    result_tx: Option<oneshot::Sender<Result<Value, CallError>>>,
    result_rx: Option<oneshot::Receiver<Result<Value, CallError>>>,
    subs: HashSet<SubId>,
    done: bool,
}

impl PendingCall {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            result_tx: Some(tx),
            result_rx: Some(rx),
            subs: HashSet::new(),
            done: false,
        }
    }
}

type PendingTable = Arc<Mutex<HashMap<CallId, PendingCall>>>;

#[derive(Default)]
pub struct SessionBuilder {
    elicit: Option<Arc<dyn ElicitHandler>>,
    sample: Option<Arc<dyn SampleHandler>>,
}

impl SessionBuilder {
    pub fn elicit_handler(mut self, handler: impl ElicitHandler + 'static) -> Self {
        self.elicit = Some(Arc::new(handler));
        self
    }

    pub fn sample_handler(mut self, handler: impl SampleHandler + 'static) -> Self {
        self.sample = Some(Arc::new(handler));
        self
    }

    pub fn connect(self, transport: Transport) -> Session {
        let (out, inbound) = transport.into_split();
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new()));
        let session_id = crate::id::new_id("session");

        let router = tokio::spawn(route(
            inbound,
            Arc::clone(&pending),
            Arc::clone(&dispatcher),
            out.clone(),
            self.elicit,
            self.sample,
            session_id.clone(),
        ));

        Session {
            out,
            pending,
            dispatcher,
            next_id: AtomicU64::new(1),
            session_id,
            router,
        }
    }
}

/// One client endpoint of a toolbus pairing.
pub struct Session {
    out: mpsc::Sender<Message>,
    pending: PendingTable,
    dispatcher: Arc<Mutex<Dispatcher>>,
    next_id: AtomicU64,
    session_id: String,
    router: JoinHandle<()>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Connect without elicitation/sampling handlers: elicitations are
    /// declined, sampling requests fail.
    pub fn connect(transport: Transport) -> Session {
        Self::builder().connect(transport)
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    async fn register_pending(&self) -> CallId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().await.insert(id, PendingCall::new());
        id
    }

    async fn send_or_fail(&self, id: CallId, msg: Message) -> Result<(), CallError> {
        if self.out.send(msg).await.is_err() {
            self.pending.lock().await.remove(&id);
            self.dispatcher.lock().await.close(id);
            return Err(CallError::Transport);
        }
        Ok(())
    }

    /// Start a call; returns its CallId without waiting for the outcome.
    pub async fn invoke(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<CallId, CallError> {
        let id = self.register_pending().await;
        self.send_or_fail(
            id,
            Message::Invoke {
                id,
                tool: tool.to_string(),
                args,
            },
        )
        .await?;
        Ok(id)
    }

    /// Start a call with a progress/log handler attached. Zero or one
    /// handler per call, registered here or never.
    pub async fn invoke_with_handler(
        &self,
        tool: &str,
        args: Map<String, Value>,
        handler: impl EventHandler + 'static,
    ) -> Result<CallId, CallError> {
        let id = self.register_pending().await;
        self.dispatcher.lock().await.register(id, Arc::new(handler));
        self.send_or_fail(
            id,
            Message::Invoke {
                id,
                tool: tool.to_string(),
                args,
            },
        )
        .await?;
        Ok(id)
    }

    /// Start a call and consume its progress/log events as a stream.
    pub async fn invoke_streaming(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<(CallId, UnboundedReceiverStream<CallEvent>), CallError> {
        let id = self.register_pending().await;
        let events = self.dispatcher.lock().await.register_stream(id);
        self.send_or_fail(
            id,
            Message::Invoke {
                id,
                tool: tool.to_string(),
                args,
            },
        )
        .await?;
        Ok((id, events))
    }

    /// Suspend until the call's result slot fills, then remove it from the
    /// correlation table. A second await of the same id (or an await of an
    /// id never invoked here) fails with `UnknownCallId`.
    pub async fn await_call(&self, id: CallId) -> Result<Value, CallError> {
        let rx = {
            let mut table = self.pending.lock().await;
            table.get_mut(&id).and_then(|call| call.result_rx.take())
        };
        let Some(rx) = rx else {
            return Err(CallError::UnknownCallId(id));
        };
        let outcome = match rx.await {
            Ok(outcome) => outcome,
            // Router dropped the slot without filling it: the session is
            // tearing down.
            Err(_) => Err(CallError::Transport),
        };
        self.pending.lock().await.remove(&id);
        outcome
    }

    /// Invoke and await in one step.
    pub async fn call(&self, tool: &str, args: Map<String, Value>) -> Result<Value, CallError> {
        let id = self.invoke(tool, args).await?;
        self.await_call(id).await
    }

    /// Invoke and await under the configured default deadline
    /// (`[session] call_timeout_secs`).
    pub async fn call_with_default_timeout(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<Value, CallError> {
        let deadline = crate::config::config().session.call_timeout();
        self.call_with_timeout(tool, args, deadline).await
    }

    /// Invoke with a deadline. On expiry the call is cancelled (timeout is a
    /// caller-side concept) and `ExchangeTimeout` is returned.
    pub async fn call_with_timeout(
        &self,
        tool: &str,
        args: Map<String, Value>,
        deadline: Duration,
    ) -> Result<Value, CallError> {
        let id = self.invoke(tool, args).await?;
        match tokio::time::timeout(deadline, self.await_call(id)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let _ = self.cancel(id).await;
                self.pending.lock().await.remove(&id);
                Err(CallError::ExchangeTimeout)
            }
        }
    }

    /// Ask the server to stop a call. The call resolves as `Cancelled`
    /// locally right away (the event sink closes and outstanding
    /// sub-exchanges are discarded) without waiting for a remote
    /// acknowledgement.
    pub async fn cancel(&self, id: CallId) -> Result<(), CallError> {
        let tx = {
            let mut table = self.pending.lock().await;
            match table.get_mut(&id) {
                Some(call) if !call.done => {
                    call.done = true;
                    call.subs.clear();
                    call.result_tx.take()
                }
                Some(_) => None, // already terminal locally
                None => return Err(CallError::UnknownCallId(id)),
            }
        };
        if let Some(tx) = tx {
            let _ = tx.send(Err(CallError::Cancelled));
        }
        self.dispatcher.lock().await.close(id);
        let _ = self.out.send(Message::Cancel { id }).await;
        Ok(())
    }

    /// Liveness round trip.
    pub async fn ping(&self) -> Result<(), CallError> {
        let id = self.register_pending().await;
        self.send_or_fail(id, Message::Ping { id }).await?;
        self.await_call(id).await.map(|_| ())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// The session's routing loop: the single writer into result slots.
async fn route(
    mut inbound: mpsc::Receiver<Message>,
    pending: PendingTable,
    dispatcher: Arc<Mutex<Dispatcher>>,
    out: mpsc::Sender<Message>,
    elicit: Option<Arc<dyn ElicitHandler>>,
    sample: Option<Arc<dyn SampleHandler>>,
    session_id: String,
) {
    logging::set_context(LogContext {
        endpoint: Some("client".to_string()),
        session: Some(session_id),
        call: None,
    });

    while let Some(msg) = inbound.recv().await {
        match msg {
            Message::Result { id, value } => {
                finish(&pending, &dispatcher, id, Ok(value)).await;
            }
            Message::Error { id, kind, message } => {
                let err = CallError::from_wire(id, kind, message);
                finish(&pending, &dispatcher, id, Err(err)).await;
            }
            Message::Progress {
                id,
                progress,
                total,
                message,
            } => {
                dispatcher.lock().await.dispatch(
                    id,
                    CallEvent::Progress {
                        progress,
                        total,
                        message,
                    },
                );
            }
            Message::Log {
                id,
                severity,
                message,
            } => {
                dispatcher
                    .lock()
                    .await
                    .dispatch(id, CallEvent::Log { severity, message });
            }
            Message::ElicitRequest {
                id,
                sub_id,
                prompt,
                schema,
            } => {
                if !register_sub(&pending, id, sub_id).await {
                    logging::debug(&format!(
                        "Elicitation for unknown call {}, dropping",
                        id
                    ));
                    continue;
                }
                let handler = elicit.clone();
                let out = out.clone();
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    let outcome = match handler {
                        Some(h) => h.handle(ElicitPrompt { prompt, schema }).await,
                        // No handler registered for this session.
                        None => ElicitOutcome::Decline,
                    };
                    // Skip the response if the call resolved locally while
                    // the handler ran (cancelled or timed out).
                    if take_sub(&pending, id, sub_id).await {
                        let _ = out
                            .send(Message::ElicitResponse {
                                id,
                                sub_id,
                                outcome,
                            })
                            .await;
                    }
                });
            }
            Message::SampleRequest {
                id,
                sub_id,
                messages,
                params,
            } => {
                if !register_sub(&pending, id, sub_id).await {
                    logging::debug(&format!("Sampling for unknown call {}, dropping", id));
                    continue;
                }
                let handler = sample.clone();
                let out = out.clone();
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    let (text, error) = match handler {
                        Some(h) => match h.handle(SampleTask { messages, params }).await {
                            Ok(text) => (Some(text), None),
                            Err(e) => (None, Some(format!("{:#}", e))),
                        },
                        None => (None, Some("no sampling handler registered".to_string())),
                    };
                    if take_sub(&pending, id, sub_id).await {
                        let _ = out
                            .send(Message::SampleResponse {
                                id,
                                sub_id,
                                text,
                                error,
                            })
                            .await;
                    }
                });
            }
            Message::Pong { id } => {
                finish(&pending, &dispatcher, id, Ok(Value::Bool(true))).await;
            }
            other => {
                logging::warn(&format!(
                    "Unexpected message on client side: {:?}",
                    other
                ));
            }
        }
    }

    // Transport gone: every pending call fails with Transport.
    let ids: Vec<CallId> = pending.lock().await.keys().copied().collect();
    for id in ids {
        finish(&pending, &dispatcher, id, Err(CallError::Transport)).await;
    }
    dispatcher.lock().await.close_all();
    logging::info("Transport closed, session router exiting");
}

/// Fill the result slot for `id` and close its event sink. Unknown ids are
/// logged and dropped: the call may have been cancelled locally while its
/// terminal was in flight.
async fn finish(
    pending: &PendingTable,
    dispatcher: &Arc<Mutex<Dispatcher>>,
    id: CallId,
    outcome: Result<Value, CallError>,
) {
    let tx = {
        let mut table = pending.lock().await;
        match table.get_mut(&id) {
            Some(call) => {
                call.done = true;
                call.subs.clear();
                call.result_tx.take()
            }
            None => None,
        }
    };
    match tx {
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => {
            logging::debug(&format!("Terminal for unknown or finished call {}", id));
        }
    }
    dispatcher.lock().await.close(id);
}

async fn register_sub(pending: &PendingTable, id: CallId, sub_id: SubId) -> bool {
    let mut table = pending.lock().await;
    match table.get_mut(&id) {
        Some(call) if !call.done => call.subs.insert(sub_id),
        _ => false,
    }
}

async fn take_sub(pending: &PendingTable, id: CallId, sub_id: SubId) -> bool {
    let mut table = pending.lock().await;
    match table.get_mut(&id) {
        Some(call) if !call.done => call.subs.remove(&sub_id),
        _ => false,
    }
}
