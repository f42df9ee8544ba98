//! Scripted elicitation/sampling handlers for e2e tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use toolbus::protocol::ElicitOutcome;
use toolbus::session::{ElicitHandler, ElicitPrompt, SampleHandler, SampleTask};

/// Accepts every elicitation with a fixed `name` field.
pub struct AcceptName(pub &'static str);

#[async_trait]
impl ElicitHandler for AcceptName {
    async fn handle(&self, _request: ElicitPrompt) -> ElicitOutcome {
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), json!(self.0));
        ElicitOutcome::Accept { data }
    }
}

/// Declines every elicitation.
pub struct DeclineAll;

#[async_trait]
impl ElicitHandler for DeclineAll {
    async fn handle(&self, _request: ElicitPrompt) -> ElicitOutcome {
        ElicitOutcome::Decline
    }
}

/// Signals when an elicitation arrives, then parks forever. Used to hold a
/// call in the awaiting-elicitation state while the test cancels it.
pub struct ParkForever {
    pub reached: Arc<Notify>,
}

#[async_trait]
impl ElicitHandler for ParkForever {
    async fn handle(&self, _request: ElicitPrompt) -> ElicitOutcome {
        self.reached.notify_one();
        futures::future::pending().await
    }
}

/// Answers every sampling request with the same text.
pub struct FixedSampler(pub &'static str);

#[async_trait]
impl SampleHandler for FixedSampler {
    async fn handle(&self, request: SampleTask) -> anyhow::Result<String> {
        assert!(!request.messages.is_empty(), "sampling request carries the conversation");
        Ok(self.0.to_string())
    }
}
