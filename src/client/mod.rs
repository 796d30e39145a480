//! # Client Module
//!
//! Correlated request/response clients layered over the event stream:
//! peer function invocation (RPC), the remote function-result cache, and
//! the workflow-scoped key-value store. Each client mints a correlation
//! id, registers a response sink, sends its request, and awaits delivery
//! under a deadline.

pub mod cache;
pub mod rpc;
pub mod store;

pub use cache::CacheClient;
pub use rpc::RpcClient;
pub use store::StoreClient;

/// Default deadline for correlated cache and store waits.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::error::TransportError;
    use crate::messaging::EventMessage;
    use crate::transport::EventTransport;

    /// Transport double that records every sent event.
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<EventMessage>>,
    }

    impl RecordingTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn sent(&self) -> Vec<EventMessage> {
            self.sent.lock().unwrap().clone()
        }

        /// Waits until a sent event matches the predicate.
        pub(crate) async fn wait_for(
            &self,
            mut predicate: impl FnMut(&EventMessage) -> bool,
        ) -> EventMessage {
            for _ in 0..200 {
                if let Some(found) = self.sent().into_iter().find(&mut predicate) {
                    return found;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            panic!("expected event was never sent");
        }
    }

    #[async_trait]
    impl EventTransport for RecordingTransport {
        async fn send_event(&self, event: &EventMessage) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(event.clone());
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
}
