//! Peer function invocation over the event stream.
//!
//! A call addresses either a named function on a peer worker
//! (`function_request`) or a workflow fragment (`flow_node_request` when
//! the node type is `flow_tool`), then awaits the correlated
//! `function_response`. Status updates are fire-and-forget.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::constants::events;
use crate::error::ClientError;
use crate::messaging::{correlation_id, CorrelationRouter, EventMessage, Meta};
use crate::models::Node;
use crate::transport::EventTransport;

/// Node type invoked as a workflow fragment rather than a named function.
const FLOW_TOOL: &str = "flow_tool";

/// Client for invoking functions on peer workers.
pub struct RpcClient {
    transport: Arc<dyn EventTransport>,
    router: CorrelationRouter,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            router: CorrelationRouter::new(),
        }
    }

    /// Invokes the function or flow behind `execution_node` and waits up
    /// to `timeout_minutes` for the correlated response payload.
    pub async fn call<P: Serialize>(
        &self,
        timeout_minutes: u64,
        execution_node: &Node,
        event_state: &EventMessage,
        payload: &P,
    ) -> Result<Vec<u8>, ClientError> {
        let payload_bytes = serde_json::to_vec(payload)?;

        let correlation = correlation_id();
        let slot = self.router.register(&correlation, 1);

        let event = if execution_node.node_type != FLOW_TOOL {
            let mut meta = Meta::new();
            meta.insert("calling_server".to_string(), json!(event_state.server));
            EventMessage {
                function: execution_node.data.function.name.clone(),
                version: execution_node.data.function.version.clone(),
                server: execution_node.data.function.server.clone(),
                node: execution_node.id.clone(),
                workflow: event_state.workflow.clone(),
                run: event_state.run.clone(),
                event: events::FUNCTION_REQUEST.to_string(),
                text: format!(
                    "Node {} is invoking a function from a tool server",
                    execution_node.id
                ),
                meta: Some(meta),
                payload: Some(payload_bytes),
                correlation_id: correlation.clone(),
            }
        } else {
            EventMessage {
                server: event_state.server.clone(),
                node: execution_node.id.clone(),
                workflow: event_state.workflow.clone(),
                run: event_state.run.clone(),
                event: events::FLOW_NODE_REQUEST.to_string(),
                text: format!(
                    "Node {} is invoking a flow from a tool server",
                    execution_node.id
                ),
                payload: Some(payload_bytes),
                correlation_id: correlation.clone(),
                ..Default::default()
            }
        };
        self.transport.send_event(&event).await?;

        let response = slot
            .wait(Duration::from_secs(timeout_minutes * 60))
            .await
            .ok_or(ClientError::Timeout)?;
        debug!(correlation_id = %correlation, "Received function response");
        match response.payload {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(ClientError::EmptyResponse),
        }
    }

    /// Emits a `status_message` carrying the event-state identifiers and
    /// an optional JSON payload. Fire-and-forget.
    pub async fn send_status_event<P: Serialize>(
        &self,
        event_state: &EventMessage,
        text: &str,
        payload: Option<&P>,
    ) -> Result<(), ClientError> {
        let payload_bytes = match payload {
            Some(payload) => Some(serde_json::to_vec(payload)?),
            None => None,
        };

        let event = EventMessage {
            function: event_state.function.clone(),
            version: event_state.version.clone(),
            node: event_state.node.clone(),
            workflow: event_state.workflow.clone(),
            run: event_state.run.clone(),
            server: event_state.server.clone(),
            event: events::STATUS_MESSAGE.to_string(),
            text: text.to_string(),
            meta: None,
            payload: payload_bytes,
            correlation_id: event_state.correlation_id.clone(),
        };
        self.transport.send_event(&event).await?;
        Ok(())
    }

    /// Delivers `function_response` events to the waiting caller by
    /// correlation id. All other events are ignored.
    pub fn handle_call_response(&self, response: &EventMessage) {
        if response.event != events::FUNCTION_RESPONSE {
            return;
        }
        self.router.deliver(&response.correlation_id, response.clone());
    }

    /// Number of calls currently awaiting a response.
    #[cfg(test)]
    pub(crate) fn pending_calls(&self) -> usize {
        self.router.pending()
    }
}
