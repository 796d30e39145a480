//! # Shared Worker State
//!
//! [`GlobalState`] ties the transport, dispatcher, function catalog, and
//! correlated clients together; handlers and user functions receive it to
//! reach the rest of the runtime. [`EventState`] is the ephemeral envelope
//! of trace identifiers copied from an inbound message so outbound
//! responses reproduce them.

use std::sync::Arc;

use crate::client::{CacheClient, RpcClient, StoreClient};
use crate::dispatcher::Dispatcher;
use crate::function::WorkerFunction;
use crate::messaging::EventMessage;
use crate::registry::SafeRegistry;
use crate::transport::EventTransport;

/// Shared state for a running worker.
pub struct GlobalState {
    /// Logical worker name advertised to the workflow server.
    pub server_name: String,
    /// Function catalog keyed by [`crate::constants::function_key`].
    pub functions: SafeRegistry<String, Arc<dyn WorkerFunction>>,
    /// Scratch space for user handlers that need cross-call state.
    pub execution_state: SafeRegistry<String, serde_json::Value>,
    pub transport: Arc<dyn EventTransport>,
    pub dispatcher: Dispatcher,
    pub rpc: RpcClient,
    pub cache: Arc<CacheClient>,
    pub store: Arc<StoreClient>,
}

impl GlobalState {
    /// Builds the shared state over a transport, constructing the
    /// correlated clients and the dispatcher.
    pub fn new(transport: Arc<dyn EventTransport>, server_name: &str, queue_size: usize) -> Self {
        Self {
            server_name: server_name.to_string(),
            functions: SafeRegistry::new(),
            execution_state: SafeRegistry::new(),
            rpc: RpcClient::new(Arc::clone(&transport)),
            cache: Arc::new(CacheClient::new(Arc::clone(&transport), server_name)),
            store: Arc::new(StoreClient::new(Arc::clone(&transport), server_name)),
            dispatcher: Dispatcher::new(queue_size.max(1)),
            transport,
        }
    }
}

/// Trace identifiers copied from an inbound message, used to stamp
/// outbound responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventState {
    pub server: String,
    pub function: String,
    /// The worker expected to own the function registry entry.
    pub function_server: String,
    pub node: String,
    pub workflow: String,
    pub version: String,
    pub run: String,
    pub correlation_id: String,
}

impl EventState {
    /// Copies the envelope of an inbound message. `function_server` is the
    /// local worker name, since inbound requests address functions
    /// registered on this worker.
    pub fn from_message(message: &EventMessage, function_server: &str) -> Self {
        Self {
            server: message.server.clone(),
            function: message.function.clone(),
            function_server: function_server.to_string(),
            node: message.node.clone(),
            workflow: message.workflow.clone(),
            version: message.version.clone(),
            run: message.run.clone(),
            correlation_id: message.correlation_id.clone(),
        }
    }

    /// Empty envelope used for the registration broadcasts sent before
    /// any request arrives.
    pub fn registration(server_name: &str) -> Self {
        Self {
            server: server_name.to_string(),
            function_server: server_name.to_string(),
            correlation_id: "startup".to_string(),
            ..Default::default()
        }
    }

    /// Synthetic envelope for the startup function-list broadcast.
    pub fn startup(server_name: &str) -> Self {
        Self {
            server: server_name.to_string(),
            function: "startup".to_string(),
            function_server: server_name.to_string(),
            node: "startup".to_string(),
            workflow: "startup".to_string(),
            version: "1.0".to_string(),
            run: "startup".to_string(),
            correlation_id: "startup".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport that accepts sends and never yields events; enough for
    /// exercising code paths that only need a wired [`GlobalState`].
    struct NullTransport;

    #[async_trait]
    impl EventTransport for NullTransport {
        async fn send_event(&self, _event: &EventMessage) -> Result<(), TransportError> {
            Ok(())
        }

        fn take_events(&self) -> Option<mpsc::Receiver<EventMessage>> {
            None
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn close(&self) {}
    }

    pub(crate) fn state_with_null_transport(server_name: &str) -> Arc<GlobalState> {
        Arc::new(GlobalState::new(Arc::new(NullTransport), server_name, 8))
    }
}
