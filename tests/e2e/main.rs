//! End-to-end tests: client session and server over an in-memory transport
//! pair, exercising the full interactive call protocol without any real I/O.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use handlers::{AcceptName, DeclineAll, FixedSampler, ParkForever};
use toolbus::dispatch::CallEvent;
use toolbus::error::{CallError, ErrorKind};
use toolbus::protocol::Message;
use toolbus::server::{CallContext, Server};
use toolbus::session::{Session, SessionBuilder};
use toolbus::tool::{integration_registry, Registry, Tool};
use toolbus::transport::Transport;

/// Spawn a server over one side of an in-memory pair; hand back the client
/// side and the server task handle.
fn spawn_server(registry: Registry) -> (Transport, JoinHandle<()>) {
    let (client_side, server_side) = Transport::pair();
    let handle = tokio::spawn(async move {
        let server = Server::new(registry);
        let _ = server.serve(server_side).await;
    });
    (client_side, handle)
}

fn connect(builder: SessionBuilder) -> Session {
    let (client_side, _handle) = spawn_server(integration_registry());
    builder.connect(client_side)
}

fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_ping() {
    let session = connect(Session::builder());
    session.ping().await.unwrap();
}

#[tokio::test]
async fn test_call_add_tool() {
    let session = connect(Session::builder());
    let value = session
        .call("add", args(&[("a", json!(5)), ("b", json!(3))]))
        .await
        .unwrap();
    assert_eq!(value, json!(8));
}

#[tokio::test]
async fn test_call_multiply_tool() {
    let session = connect(Session::builder());
    let value = session
        .call("multiply", args(&[("a", json!(4)), ("b", json!(7))]))
        .await
        .unwrap();
    assert_eq!(value, json!(28));
}

#[tokio::test]
async fn test_call_greet_tool() {
    let session = connect(Session::builder());
    let value = session
        .call("greet", args(&[("name", json!("World"))]))
        .await
        .unwrap();
    assert_eq!(value, json!("Hello, World!"));
}

#[tokio::test]
async fn test_call_echo_tool() {
    let session = connect(Session::builder());
    let message = "Testing echo functionality";
    let value = session
        .call("echo", args(&[("message", json!(message))]))
        .await
        .unwrap();
    assert_eq!(value, json!(message));
}

#[tokio::test]
async fn test_multiple_sequential_calls() {
    let session = connect(Session::builder());

    let first = session
        .call("add", args(&[("a", json!(10)), ("b", json!(20))]))
        .await
        .unwrap();
    assert_eq!(first, json!(30));

    let second = session
        .call("multiply", args(&[("a", json!(5)), ("b", json!(6))]))
        .await
        .unwrap();
    assert_eq!(second, json!(30));

    let third = session
        .call("greet", args(&[("name", json!("World"))]))
        .await
        .unwrap();
    assert_eq!(third, json!("Hello, World!"));
}

#[tokio::test]
async fn test_concurrent_calls_correlate() {
    let session = connect(Session::builder());

    // Start all five before awaiting any: the calls are in flight together
    // and the results must come back to the right CallIds.
    let mut ids = Vec::new();
    for i in 0..5i64 {
        let id = session
            .invoke("add", args(&[("a", json!(i)), ("b", json!(i + 1))]))
            .await
            .unwrap();
        ids.push((i, id));
    }
    for (i, id) in ids {
        let value = session.await_call(id).await.unwrap();
        assert_eq!(value, json!(2 * i + 1), "call {} got the wrong result", i);
    }
}

#[tokio::test]
async fn test_tool_not_found() {
    let session = connect(Session::builder());
    let err = session.call("frobnicate", Map::new()).await.unwrap_err();
    assert_eq!(err, CallError::ToolNotFound("frobnicate".to_string()));
}

#[tokio::test]
async fn test_missing_argument_rejected() {
    let session = connect(Session::builder());
    let err = session
        .call("add", args(&[("a", json!(1))]))
        .await
        .unwrap_err();
    match err {
        CallError::InvalidArguments(msg) => assert!(msg.contains("'b'")),
        other => panic!("wrong error: {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_failure_only_fails_that_call() {
    let session = connect(Session::builder());

    let bad = session
        .invoke("add", args(&[("a", json!("not a number")), ("b", json!(1))]))
        .await
        .unwrap();
    let good = session
        .invoke("add", args(&[("a", json!(2)), ("b", json!(2))]))
        .await
        .unwrap();

    assert!(session.await_call(bad).await.is_err());
    assert_eq!(session.await_call(good).await.unwrap(), json!(4));
}

#[tokio::test]
async fn test_progress_events_stream_in_order() {
    let session = connect(Session::builder());

    let (id, events) = session.invoke_streaming("progress_tool", Map::new()).await.unwrap();
    assert_eq!(session.await_call(id).await.unwrap(), json!(100));

    // The sink closed at the terminal, so the stream is finite.
    let events: Vec<CallEvent> = events.collect().await;
    let progress: Vec<(f64, Option<f64>, String)> = events
        .into_iter()
        .map(|event| match event {
            CallEvent::Progress {
                progress,
                total,
                message,
            } => (progress, total, message),
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();

    assert_eq!(
        progress,
        vec![
            (1.0, Some(3.0), "33.33% complete".to_string()),
            (2.0, Some(3.0), "66.67% complete".to_string()),
            (3.0, Some(3.0), "100.00% complete".to_string()),
        ]
    );

    // Monotonic, and the final event reaches the total.
    for pair in progress.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
    }
    let last = progress.last().unwrap();
    assert_eq!(Some(last.0), last.1);
}

#[tokio::test]
async fn test_progress_handler_callback() {
    let session = connect(Session::builder());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let id = session
        .invoke_with_handler("progress_tool", Map::new(), move |event: CallEvent| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();
    assert_eq!(session.await_call(id).await.unwrap(), json!(100));

    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        seen.push(event);
    }
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn test_events_without_handler_are_discarded() {
    let session = connect(Session::builder());
    // No handler registered for this call; must still complete cleanly.
    let value = session.call("progress_tool", Map::new()).await.unwrap();
    assert_eq!(value, json!(100));
}

#[tokio::test]
async fn test_elicitation_accept() {
    let session = connect(Session::builder().elicit_handler(AcceptName("Alice")));
    let value = session.call("ask_for_name", Map::new()).await.unwrap();
    assert_eq!(value, json!("Hello, Alice!"));
}

#[tokio::test]
async fn test_elicitation_decline() {
    let session = connect(Session::builder().elicit_handler(DeclineAll));
    let value = session.call("ask_for_name", Map::new()).await.unwrap();
    assert_eq!(value, json!("No name provided."));
}

#[tokio::test]
async fn test_elicitation_without_handler_declines() {
    let session = connect(Session::builder());
    let value = session.call("ask_for_name", Map::new()).await.unwrap();
    assert_eq!(value, json!("No name provided."));
}

#[tokio::test]
async fn test_sampling() {
    let session = connect(
        Session::builder().sample_handler(FixedSampler("This is the sample message!")),
    );
    let value = session
        .call("simple_sample", args(&[("message", json!("Hello, world!"))]))
        .await
        .unwrap();
    assert_eq!(value, json!("This is the sample message!"));
}

#[tokio::test]
async fn test_sampling_without_handler_fails_the_call() {
    let session = connect(Session::builder());
    let err = session
        .call("simple_sample", args(&[("message", json!("Hello, world!"))]))
        .await
        .unwrap_err();
    match err {
        CallError::ToolExecution(msg) => assert!(msg.contains("no sampling handler")),
        other => panic!("wrong error: {:?}", other),
    }
}

/// Emits progress, suspends on an elicitation, then emits progress again.
/// The second event must never appear when the call is cancelled while
/// suspended.
struct ChattyAskTool;

#[async_trait]
impl Tool for ChattyAskTool {
    fn name(&self) -> &str {
        "chatty_ask"
    }

    fn description(&self) -> &str {
        "Report progress around an elicitation"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Map<String, Value>, ctx: CallContext) -> Result<Value> {
        ctx.progress(1.0, Some(2.0), "before").await?;
        let _answer = ctx
            .elicit("Proceed?", json!({ "type": "object", "properties": {} }))
            .await?;
        ctx.progress(2.0, Some(2.0), "after").await?;
        Ok(json!("done"))
    }
}

#[tokio::test]
async fn test_cancel_during_elicitation() {
    let mut registry = integration_registry();
    registry.register(Arc::new(ChattyAskTool));
    let (client_side, _handle) = spawn_server(registry);

    let reached = Arc::new(Notify::new());
    let session = Session::builder()
        .elicit_handler(ParkForever {
            reached: Arc::clone(&reached),
        })
        .connect(client_side);

    let (id, events) = session.invoke_streaming("chatty_ask", Map::new()).await.unwrap();

    // Hold the call in AwaitingElicitation, then cancel it.
    reached.notified().await;
    session.cancel(id).await.unwrap();
    assert_eq!(session.await_call(id).await, Err(CallError::Cancelled));

    // Only the pre-elicitation event was dispatched.
    let events: Vec<CallEvent> = events.collect().await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        CallEvent::Progress { message, .. } => assert_eq!(message, "before"),
        other => panic!("unexpected event: {:?}", other),
    }

    // The session is still healthy for subsequent calls.
    let value = session
        .call("add", args(&[("a", json!(1)), ("b", json!(1))]))
        .await
        .unwrap();
    assert_eq!(value, json!(2));
}

#[tokio::test]
async fn test_call_with_timeout_cancels() {
    let reached = Arc::new(Notify::new());
    let session = connect(Session::builder().elicit_handler(ParkForever {
        reached: Arc::clone(&reached),
    }));

    let err = session
        .call_with_timeout("ask_for_name", Map::new(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, CallError::ExchangeTimeout);
}

#[tokio::test]
async fn test_transport_failure_fails_in_flight_interactive_call() {
    // Drive the server side of the wire directly so the transport can be
    // broken mid-exchange.
    let (client_side, mut peer) = Transport::pair();
    let reached = Arc::new(Notify::new());
    let session = Session::builder()
        .elicit_handler(ParkForever {
            reached: Arc::clone(&reached),
        })
        .connect(client_side);

    let id = session.invoke("ask_for_name", Map::new()).await.unwrap();
    match peer.recv().await.unwrap() {
        Message::Invoke { id: got, .. } => assert_eq!(got, id),
        other => panic!("expected invoke, got {:?}", other),
    }
    peer.send(Message::ElicitRequest {
        id,
        sub_id: 1,
        prompt: "What is your name?".to_string(),
        schema: json!({ "type": "object", "properties": {} }),
    })
    .await
    .unwrap();
    reached.notified().await;

    // The peer dies while the call is suspended on the exchange.
    drop(peer);
    assert_eq!(session.await_call(id).await, Err(CallError::Transport));
}

#[tokio::test]
async fn test_duplicate_in_flight_call_id_rejected() {
    // Drive the wire directly: the session would never reuse a live id, but
    // the server still has to defend the invariant.
    let (mut client_side, _handle) = spawn_server(integration_registry());

    client_side
        .send(Message::Invoke {
            id: 1,
            tool: "ask_for_name".to_string(),
            args: Map::new(),
        })
        .await
        .unwrap();

    // The call parks at its elicitation request.
    match client_side.recv().await.unwrap() {
        Message::ElicitRequest { id: 1, .. } => {}
        other => panic!("expected elicitation, got {:?}", other),
    }

    client_side
        .send(Message::Invoke {
            id: 1,
            tool: "add".to_string(),
            args: args(&[("a", json!(1)), ("b", json!(2))]),
        })
        .await
        .unwrap();

    match client_side.recv().await.unwrap() {
        Message::Error { id: 1, kind, .. } => assert_eq!(kind, ErrorKind::InvalidArguments),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_registry_listing_matches_harness_expectations() {
    let registry = integration_registry();

    let names = registry.tool_names();
    for expected in ["add", "multiply", "greet", "echo"] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }
    assert_eq!(registry.describe("add").unwrap().description, "Add two numbers");

    assert_eq!(registry.resource_uris(), vec!["message://hello"]);
    assert_eq!(
        registry.read_resource("message://hello").await.unwrap(),
        "Hello from the resource!"
    );

    let prompts: Vec<String> = registry
        .prompt_definitions()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert!(prompts.contains(&"greeting_prompt".to_string()));
    assert!(prompts.contains(&"math_prompt".to_string()));

    assert_eq!(
        registry
            .render_prompt("greeting_prompt", &args(&[("name", json!("Alice"))]))
            .unwrap(),
        "Please greet Alice in a friendly way"
    );
    assert_eq!(
        registry
            .render_prompt(
                "math_prompt",
                &args(&[
                    ("operation", json!("add")),
                    ("x", json!(10)),
                    ("y", json!(20))
                ])
            )
            .unwrap(),
        "Please add the numbers 10 and 20"
    );
}
