//! # Handler Wiring
//!
//! Registers one dispatcher handler per understood event name, pumps
//! inbound transport events into the dispatcher, and provides the
//! outbound send helpers used for responses and broadcasts.
//!
//! Inbound messages with an empty `workflow` are discarded before
//! dispatch unless the event is a cache/store response or one of the
//! introspection requests, so orphaned work never occupies dispatcher
//! slots.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::{events, function_key};
use crate::error::FunctionError;
use crate::messaging::EventMessage;
use crate::state::{EventState, GlobalState};

/// Events allowed through the dispatcher without a workflow id.
const WORKFLOW_EXEMPT_EVENTS: [&str; 7] = [
    events::CACHE_GET_RESPONSE,
    events::CACHE_SET_RESPONSE,
    events::STORE_GET_RESPONSE,
    events::STORE_SET_RESPONSE,
    events::REQUEST_SERVER_INFO,
    events::REQUEST_SERVER_NAME,
    events::REQUEST_LIST_FUNCTIONS,
];

/// Registers the dispatcher handlers for every inbound event the worker
/// understands.
pub fn register_handlers(state: &Arc<GlobalState>) {
    let dispatcher = &state.dispatcher;

    {
        let state = Arc::clone(state);
        dispatcher.register(events::FUNCTION_REQUEST, move |message| {
            let state = Arc::clone(&state);
            async move { handle_function_request(state, message).await }
        });
    }

    {
        let state = Arc::clone(state);
        dispatcher.register(events::FUNCTION_RESPONSE, move |message| {
            let state = Arc::clone(&state);
            async move { state.rpc.handle_call_response(&message) }
        });
    }

    for event in [events::CACHE_GET_RESPONSE, events::CACHE_SET_RESPONSE] {
        let state = Arc::clone(state);
        dispatcher.register(event, move |message| {
            let state = Arc::clone(&state);
            async move { state.cache.handle_response(&message) }
        });
    }

    for event in [events::STORE_GET_RESPONSE, events::STORE_SET_RESPONSE] {
        let state = Arc::clone(state);
        dispatcher.register(event, move |message| {
            let state = Arc::clone(&state);
            async move { state.store.handle_response(&message) }
        });
    }

    {
        let state = Arc::clone(state);
        dispatcher.register(events::REQUEST_LIST_FUNCTIONS, move |message| {
            let state = Arc::clone(&state);
            async move {
                let fs = EventState::from_message(&message, &state.server_name);
                send_function_list(&state, &fs).await;
            }
        });
    }

    {
        let state = Arc::clone(state);
        dispatcher.register(events::REQUEST_SERVER_NAME, move |message| {
            let state = Arc::clone(&state);
            async move {
                let fs = EventState::from_message(&message, &state.server_name);
                send_server_name(&state, &fs).await;
            }
        });
    }

    {
        let state = Arc::clone(state);
        dispatcher.register(events::REQUEST_SERVER_INFO, move |message| {
            let state = Arc::clone(&state);
            async move {
                let fs = EventState::from_message(&message, &state.server_name);
                send_server_name(&state, &fs).await;
                send_function_list(&state, &fs).await;
            }
        });
    }
}

/// Starts the pump that reads transport events, applies the workflow
/// filter, and feeds the dispatcher. Returns `None` when the inbound
/// sequence was already taken.
pub fn spawn_inbound_pump(state: &Arc<GlobalState>) -> Option<JoinHandle<()>> {
    let mut events_rx = state.transport.take_events()?;
    let state = Arc::clone(state);
    Some(tokio::spawn(async move {
        while let Some(message) = events_rx.recv().await {
            info!(
                event = %message.event,
                workflow = %message.workflow,
                "Received workflow message"
            );
            if message.workflow.is_empty()
                && !WORKFLOW_EXEMPT_EVENTS.contains(&message.event.as_str())
            {
                info!(event = %message.event, "Workflow is empty, skipping");
                continue;
            }
            state.dispatcher.dispatch(message).await;
        }
    }))
}

/// Looks up the addressed function, executes it, and reports the result
/// or failure back on the wire under the original correlation id.
async fn handle_function_request(state: Arc<GlobalState>, message: EventMessage) {
    let fs = EventState::from_message(&message, &state.server_name);
    info!(function = %message.function, "Received function request");

    let key = function_key(&fs.function_server, &fs.function, &fs.version);
    let Some(function) = state.functions.load(&key) else {
        let err = FunctionError::NotFound { key };
        send_error_event(&state, &fs, &err.to_string()).await;
        return;
    };

    match function
        .execute(message.payload.as_deref(), &message, Arc::clone(&state))
        .await
    {
        Ok(outputs) => send_function_response(&state, &fs, outputs).await,
        Err(e) => {
            send_error_event(&state, &fs, &format!("Function execution failed: {e}")).await;
        }
    }
}

/// Emits an `error` event addressed by the given event state.
pub async fn send_error_event(state: &GlobalState, fs: &EventState, error_text: &str) {
    let event = EventMessage {
        server: state.server_name.clone(),
        function: fs.function.clone(),
        version: fs.version.clone(),
        node: fs.node.clone(),
        workflow: fs.workflow.clone(),
        run: fs.run.clone(),
        event: events::ERROR.to_string(),
        text: error_text.to_string(),
        correlation_id: fs.correlation_id.clone(),
        ..Default::default()
    };
    if let Err(e) = state.transport.send_event(&event).await {
        warn!("Failed to send error event: {e}");
    }
}

/// Emits a `function_response` carrying the execution output under the
/// original correlation id.
pub async fn send_function_response(state: &GlobalState, fs: &EventState, payload: Vec<u8>) {
    let event = EventMessage {
        function: fs.function.clone(),
        version: fs.version.clone(),
        node: fs.node.clone(),
        workflow: fs.workflow.clone(),
        run: fs.run.clone(),
        event: events::FUNCTION_RESPONSE.to_string(),
        payload: Some(payload),
        correlation_id: fs.correlation_id.clone(),
        ..Default::default()
    };
    if let Err(e) = state.transport.send_event(&event).await {
        warn!("Failed to send function response: {e}");
    }
}

/// Emits a `response_list_functions` broadcast with the JSON-encoded
/// catalog of registered function definitions.
pub async fn send_function_list(state: &GlobalState, fs: &EventState) {
    let mut definitions = Vec::new();
    state.functions.for_each(|_, function| {
        definitions.push(function.definition());
        true
    });

    let payload = match serde_json::to_vec(&definitions) {
        Ok(payload) => payload,
        Err(e) => {
            send_error_event(state, fs, &format!("Error serializing functions: {e}")).await;
            return;
        }
    };

    let event = EventMessage {
        function: fs.function.clone(),
        version: fs.version.clone(),
        node: fs.node.clone(),
        workflow: fs.workflow.clone(),
        run: fs.run.clone(),
        server: state.server_name.clone(),
        event: events::RESPONSE_LIST_FUNCTIONS.to_string(),
        text: "List of functions".to_string(),
        payload: Some(payload),
        correlation_id: fs.correlation_id.clone(),
        ..Default::default()
    };
    if let Err(e) = state.transport.send_event(&event).await {
        warn!("Failed to send function list response: {e}");
    }
}

/// Emits a `response_server_name` carrying the worker name.
pub async fn send_server_name(state: &GlobalState, fs: &EventState) {
    let event = EventMessage {
        function: fs.function.clone(),
        version: fs.version.clone(),
        node: fs.node.clone(),
        workflow: fs.workflow.clone(),
        run: fs.run.clone(),
        server: state.server_name.clone(),
        event: events::RESPONSE_SERVER_NAME.to_string(),
        text: state.server_name.clone(),
        correlation_id: fs.correlation_id.clone(),
        ..Default::default()
    };
    if let Err(e) = state.transport.send_event(&event).await {
        warn!("Failed to send server name response: {e}");
    }
}
