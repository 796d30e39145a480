//! Remote key-value store over the event stream.
//!
//! Values are scoped by `(workflow, key)`: the workflow id rides on both
//! the envelope and the request metadata so the workflow server can
//! partition storage per run. Reads are correlated request/response
//! pairs; writes are fire-and-forget.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::client::DEFAULT_TIMEOUT_SECS;
use crate::constants::events;
use crate::error::ClientError;
use crate::messaging::{correlation_id, CorrelationRouter, EventMessage, Meta};
use crate::transport::EventTransport;

/// Store client backed by the workflow server.
pub struct StoreClient {
    transport: Arc<dyn EventTransport>,
    router: CorrelationRouter,
    default_timeout: Duration,
    server_name: String,
}

impl StoreClient {
    pub fn new(transport: Arc<dyn EventTransport>, server_name: &str) -> Self {
        Self {
            transport,
            router: CorrelationRouter::new(),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            server_name: server_name.to_string(),
        }
    }

    /// Overrides the correlated-wait deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Requests a stored value, waiting for the correlated
    /// `store_get_response`.
    pub async fn get(&self, workflow_id: &str, key: &str) -> Result<Vec<u8>, ClientError> {
        let correlation = correlation_id();
        let slot = self.router.register(&correlation, 1);

        let mut meta = Meta::new();
        meta.insert("Workflow".to_string(), json!(workflow_id));
        meta.insert("Key".to_string(), json!(key));
        meta.insert("calling_server".to_string(), json!(self.server_name));

        let event = EventMessage {
            workflow: workflow_id.to_string(),
            event: events::STORE_GET_REQUEST.to_string(),
            text: "Store get request".to_string(),
            meta: Some(meta),
            correlation_id: correlation,
            ..Default::default()
        };
        self.transport.send_event(&event).await?;

        let response = slot
            .wait(self.default_timeout)
            .await
            .ok_or(ClientError::Timeout)?;
        match response.payload {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(ClientError::EmptyResponse),
        }
    }

    /// Convenience read returning UTF-8 text.
    pub async fn get_string(&self, workflow_id: &str, key: &str) -> Result<String, ClientError> {
        let bytes = self.get(workflow_id, key).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Stores a value for a workflow and key. Fire-and-forget.
    pub async fn set(
        &self,
        workflow_id: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), ClientError> {
        // Copy so the caller mutating its buffer after send cannot change
        // the bytes on the wire.
        let payload = value.to_vec();

        let mut meta = Meta::new();
        meta.insert("Workflow".to_string(), json!(workflow_id));
        meta.insert("Key".to_string(), json!(key));
        meta.insert("calling_server".to_string(), json!(self.server_name));

        let event = EventMessage {
            workflow: workflow_id.to_string(),
            event: events::STORE_SET_REQUEST.to_string(),
            text: "Store set request".to_string(),
            meta: Some(meta),
            payload: Some(payload),
            correlation_id: correlation_id(),
            ..Default::default()
        };
        self.transport.send_event(&event).await?;
        Ok(())
    }

    /// Convenience write for UTF-8 text.
    pub async fn set_string(
        &self,
        workflow_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ClientError> {
        self.set(workflow_id, key, value.as_bytes()).await
    }

    /// Delivers store response events to the waiting caller by
    /// correlation id. All other events are ignored.
    pub fn handle_response(&self, response: &EventMessage) {
        if response.event != events::STORE_GET_RESPONSE
            && response.event != events::STORE_SET_RESPONSE
        {
            return;
        }
        debug!(correlation_id = %response.correlation_id, "Delivering store response");
        self.router.deliver(&response.correlation_id, response.clone());
    }
}
