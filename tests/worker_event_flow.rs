//! End-to-end event flow through the dispatcher and handlers: function
//! round trips, error reporting, memoization over the remote cache,
//! introspection, and the inbound workflow filter.

mod common;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use codex_worker::constants::events;
use codex_worker::function::{Function, FunctionBuilder};
use codex_worker::messaging::EventMessage;

use common::{next_matching, start_worker};

const DEADLINE: Duration = Duration::from_secs(2);

#[derive(Serialize, Deserialize, schemars::JsonSchema)]
struct EchoInput {
    text: String,
}

#[derive(Serialize, Deserialize, schemars::JsonSchema)]
struct EchoOutput {
    output: String,
}

fn echo_function() -> Function<EchoInput, EchoOutput> {
    Function::new("example_input", "1.0.0", "Echoes its input").with_simple_handler(
        |input: EchoInput| async move {
            if input.text == "error" {
                return Err("input rejected".to_string());
            }
            Ok(EchoOutput { output: input.text })
        },
    )
}

fn builders(function: Function<EchoInput, EchoOutput>) -> Vec<Box<dyn FunctionBuilder>> {
    vec![Box::new(function)]
}

fn function_request(correlation_id: &str, payload: &str) -> EventMessage {
    EventMessage {
        function: "example_input".into(),
        version: "1.0.0".into(),
        server: "w1".into(),
        workflow: "wf1".into(),
        event: events::FUNCTION_REQUEST.into(),
        payload: Some(payload.as_bytes().to_vec()),
        correlation_id: correlation_id.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn function_request_round_trip() {
    let worker = start_worker("w1", builders(echo_function())).await;
    let mut outbound = worker.transport.watch_outbound();

    worker
        .inbound
        .send(function_request("c1", r#"{"text":"hello"}"#))
        .await
        .unwrap();

    let response = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::FUNCTION_RESPONSE
    })
    .await
    .expect("no function_response observed");

    assert_eq!(response.correlation_id, "c1");
    assert_eq!(response.payload, Some(br#"{"output":"hello"}"#.to_vec()));
    assert_eq!(response.workflow, "wf1");
}

#[tokio::test]
async fn handler_failure_reports_error_event() {
    let worker = start_worker("w1", builders(echo_function())).await;
    let mut outbound = worker.transport.watch_outbound();

    worker
        .inbound
        .send(function_request("c1", r#"{"text":"error"}"#))
        .await
        .unwrap();

    let error = next_matching(&mut outbound, DEADLINE, |e| e.event == events::ERROR)
        .await
        .expect("no error event observed");

    assert_eq!(error.correlation_id, "c1");
    assert!(
        error.text.starts_with("Function execution failed:"),
        "unexpected error text: {}",
        error.text
    );
}

#[tokio::test]
async fn unknown_function_reports_not_found() {
    let worker = start_worker("w1", Vec::new()).await;
    let mut outbound = worker.transport.watch_outbound();

    worker
        .inbound
        .send(function_request("c3", r#"{"text":"hello"}"#))
        .await
        .unwrap();

    let error = next_matching(&mut outbound, DEADLINE, |e| e.event == events::ERROR)
        .await
        .expect("no error event observed");
    assert_eq!(error.correlation_id, "c3");
    assert_eq!(
        error.text,
        "Function not found: function:w1:example_input:1.0.0"
    );
}

#[tokio::test]
async fn cached_function_skips_rerun_and_reuses_stored_bytes() {
    let worker = start_worker(
        "w1",
        builders(echo_function().with_cache_ttl(Duration::from_secs(60))),
    )
    .await;
    let mut outbound = worker.transport.watch_outbound();

    // Emulate the workflow server's cache: answer get requests from a
    // local map fed by observed set events.
    {
        let mut cache_events = worker.transport.watch_outbound();
        let inbound = worker.inbound.clone();
        tokio::spawn(async move {
            let mut store: std::collections::HashMap<String, Vec<u8>> =
                std::collections::HashMap::new();
            loop {
                let Ok(event) = cache_events.recv().await else {
                    return;
                };
                match event.event.as_str() {
                    e if e == events::CACHE_SET => {
                        if let (Some(meta), Some(payload)) = (&event.meta, &event.payload) {
                            if let Some(key) = meta.get("Key").and_then(|k| k.as_str()) {
                                store.insert(key.to_string(), payload.clone());
                            }
                        }
                    }
                    e if e == events::CACHE_GET_REQUEST => {
                        let key = event
                            .meta
                            .as_ref()
                            .and_then(|m| m.get("Key"))
                            .and_then(|k| k.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let response = EventMessage {
                            event: events::CACHE_GET_RESPONSE.into(),
                            payload: store.get(&key).cloned(),
                            correlation_id: event.correlation_id.clone(),
                            ..Default::default()
                        };
                        let _ = inbound.send(response).await;
                    }
                    _ => {}
                }
            }
        });
    }

    worker
        .inbound
        .send(function_request("c1", r#"{"text":"x"}"#))
        .await
        .unwrap();
    let first = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::FUNCTION_RESPONSE && e.correlation_id == "c1"
    })
    .await
    .expect("no first response");
    assert_eq!(first.payload, Some(br#"{"output":"x"}"#.to_vec()));
    assert_eq!(worker.transport.sent_count(events::CACHE_SET), 1);

    // Identical input under a new correlation id: served from the cache,
    // no additional store.
    worker
        .inbound
        .send(function_request("c2", r#"{"text":"x"}"#))
        .await
        .unwrap();
    let second = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::FUNCTION_RESPONSE && e.correlation_id == "c2"
    })
    .await
    .expect("no second response");

    assert_eq!(second.payload, first.payload);
    assert_eq!(worker.transport.sent_count(events::CACHE_SET), 1);
}

#[tokio::test]
async fn server_info_yields_name_and_function_list() {
    let worker = start_worker("w1", builders(echo_function())).await;
    assert_eq!(worker.state.functions.len(), 1);
    let mut outbound = worker.transport.watch_outbound();

    worker
        .inbound
        .send(EventMessage {
            event: events::REQUEST_SERVER_INFO.into(),
            correlation_id: "c9".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let name = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::RESPONSE_SERVER_NAME
    })
    .await
    .expect("no server name response");
    assert_eq!(name.correlation_id, "c9");
    assert_eq!(name.text, "w1");

    let list = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::RESPONSE_LIST_FUNCTIONS
    })
    .await
    .expect("no function list response");
    assert_eq!(list.correlation_id, "c9");

    let definitions: serde_json::Value =
        serde_json::from_slice(&list.payload.unwrap()).unwrap();
    let definitions = definitions.as_array().unwrap();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0]["name"], "example_input");
    assert_eq!(definitions[0]["version"], "1.0.0");
    assert_eq!(definitions[0]["server"], "w1");
}

#[tokio::test]
async fn list_functions_request_is_served_without_workflow() {
    let worker = start_worker("w1", builders(echo_function())).await;
    let mut outbound = worker.transport.watch_outbound();

    worker
        .inbound
        .send(EventMessage {
            event: events::REQUEST_LIST_FUNCTIONS.into(),
            correlation_id: "c4".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let list = next_matching(&mut outbound, DEADLINE, |e| {
        e.event == events::RESPONSE_LIST_FUNCTIONS
    })
    .await
    .expect("no function list response");
    assert_eq!(list.correlation_id, "c4");
}

#[tokio::test]
async fn workflowless_function_request_is_filtered() {
    let worker = start_worker("w1", builders(echo_function())).await;

    let mut request = function_request("c5", r#"{"text":"hello"}"#);
    request.workflow = String::new();
    worker.inbound.send(request).await.unwrap();

    // The message never reaches a handler, so nothing is sent back.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(worker.transport.sent().is_empty());
}

#[tokio::test]
async fn unknown_event_with_workflow_is_discarded_quietly() {
    let worker = start_worker("w1", builders(echo_function())).await;

    worker
        .inbound
        .send(EventMessage {
            event: "never_heard_of_it".into(),
            workflow: "wf1".into(),
            correlation_id: "c6".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(worker.transport.sent().is_empty());
}
