//! Delivery of per-call progress/log notifications to caller handlers.
//!
//! Each call gets at most one sink, registered at invoke time. Dispatch
//! never blocks the session router: events go into an unbounded per-call
//! queue and a forwarding task drains it, so a slow handler only delays its
//! own call's events. Per-call delivery is FIFO; cross-call ordering is
//! unspecified. Events for calls without a sink are discarded, not buffered.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::logging;
use crate::protocol::{CallId, Severity};

/// An out-of-band notification scoped to one call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Progress {
        progress: f64,
        total: Option<f64>,
        message: String,
    },
    Log {
        severity: Severity,
        message: String,
    },
}

/// Caller-registered sink for one call's events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

impl<F> EventHandler for F
where
    F: Fn(CallEvent) + Send + Sync,
{
    fn on_event(&self, event: CallEvent) {
        self(event)
    }
}

/// Routes inbound progress/log messages to the right per-call queue.
#[derive(Default)]
pub(crate) struct Dispatcher {
    sinks: HashMap<CallId, mpsc::UnboundedSender<CallEvent>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `id`, draining its queue on a dedicated task.
    pub fn register(&mut self, id: CallId, handler: Arc<dyn EventHandler>) {
        let mut rx = self.attach(id);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_event(event);
            }
        });
    }

    /// Register a streaming consumer for `id` instead of a callback.
    pub fn register_stream(&mut self, id: CallId) -> UnboundedReceiverStream<CallEvent> {
        UnboundedReceiverStream::new(self.attach(id))
    }

    fn attach(&mut self, id: CallId) -> mpsc::UnboundedReceiver<CallEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.sinks.insert(id, tx).is_some() {
            logging::warn(&format!("Replacing event sink for call {}", id));
        }
        rx
    }

    /// Deliver one event. Unknown or lapsed CallIds are dropped: the call
    /// may have been cancelled locally while events were in flight.
    pub fn dispatch(&mut self, id: CallId, event: CallEvent) {
        match self.sinks.get(&id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    self.sinks.remove(&id);
                }
            }
            None => {
                logging::debug(&format!("Dropping event for unknown call {}", id));
            }
        }
    }

    /// Detach the sink for `id`. Already-queued events still drain; nothing
    /// new is delivered.
    pub fn close(&mut self, id: CallId) {
        self.sinks.remove(&id);
    }

    /// Detach every sink (transport teardown).
    pub fn close_all(&mut self) {
        self.sinks.clear();
    }
}
