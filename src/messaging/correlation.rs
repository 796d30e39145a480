//! Correlation router for request/response matching over the stream.
//!
//! Every correlated request registers a single-slot response sink keyed by
//! its correlation id before sending, then awaits delivery under a
//! deadline. The registration is removed by a scoped guard on all exit
//! paths so leaked sinks are structurally impossible.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::messaging::message::EventMessage;
use crate::registry::SafeRegistry;

/// Routes response messages to waiting callers by correlation id.
#[derive(Clone, Default)]
pub struct CorrelationRouter {
    sinks: Arc<SafeRegistry<String, mpsc::Sender<EventMessage>>>,
}

impl CorrelationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates and stores a response sink for the given id.
    ///
    /// A prior registration under the same id is silently overwritten. The
    /// returned slot removes the registration when dropped.
    pub fn register(&self, id: &str, buffer: usize) -> ResponseSlot {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.sinks.store(id.to_string(), tx);
        ResponseSlot {
            id: id.to_string(),
            rx,
            router: self.clone(),
        }
    }

    /// Delivers a message to the registered sink for the given id.
    ///
    /// Non-blocking and total: no registration, a full buffer (duplicate
    /// delivery), or a gone waiter all drop the message.
    pub fn deliver(&self, id: &str, msg: EventMessage) {
        if let Some(sink) = self.sinks.load(&id.to_string()) {
            if sink.try_send(msg).is_err() {
                debug!(correlation_id = %id, "Dropping duplicate or unawaited delivery");
            }
        }
    }

    /// Deletes the sink registration for the given id.
    pub fn remove(&self, id: &str) {
        self.sinks.remove(&id.to_string());
    }

    /// Number of currently registered sinks.
    pub fn pending(&self) -> usize {
        self.sinks.len()
    }
}

/// A registered response sink, removed from the router on drop.
pub struct ResponseSlot {
    id: String,
    rx: mpsc::Receiver<EventMessage>,
    router: CorrelationRouter,
}

impl ResponseSlot {
    /// The correlation id this slot is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for a delivered message or the deadline, whichever comes
    /// first. Consumes the slot, releasing the registration.
    pub async fn wait(mut self, deadline: Duration) -> Option<EventMessage> {
        tokio::time::timeout(deadline, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for ResponseSlot {
    fn drop(&mut self) {
        self.router.remove(&self.id);
    }
}
