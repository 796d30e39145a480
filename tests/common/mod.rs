//! Shared test support: an in-memory transport double and a fully wired
//! worker state for end-to-end event flow tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use codex_worker::constants::function_key;
use codex_worker::error::TransportError;
use codex_worker::function::FunctionBuilder;
use codex_worker::handlers;
use codex_worker::messaging::EventMessage;
use codex_worker::state::GlobalState;
use codex_worker::transport::EventTransport;

/// Transport double: tests inject inbound events and observe everything
/// the worker sends.
pub struct MockTransport {
    inbound_tx: mpsc::Sender<EventMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<EventMessage>>>,
    sent: Mutex<Vec<EventMessage>>,
    outbound_tx: broadcast::Sender<EventMessage>,
}

impl MockTransport {
    pub fn new(buffer: usize) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let (outbound_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            sent: Mutex::new(Vec::new()),
            outbound_tx,
        })
    }

    /// Sender for injecting inbound events as if they arrived on the
    /// stream.
    pub fn inbound(&self) -> mpsc::Sender<EventMessage> {
        self.inbound_tx.clone()
    }

    /// Subscribes to outbound events as the workflow server would see
    /// them.
    pub fn watch_outbound(&self) -> broadcast::Receiver<EventMessage> {
        self.outbound_tx.subscribe()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<EventMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Count of sent events with the given name.
    pub fn sent_count(&self, event: &str) -> usize {
        self.sent().iter().filter(|e| e.event == event).count()
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn send_event(&self, event: &EventMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(event.clone());
        let _ = self.outbound_tx.send(event.clone());
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EventMessage>> {
        self.inbound_rx.lock().unwrap().take()
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

/// A worker wired over the mock transport, with handlers registered and
/// the inbound pump running.
pub struct TestWorker {
    pub state: Arc<GlobalState>,
    pub transport: Arc<MockTransport>,
    pub inbound: mpsc::Sender<EventMessage>,
}

pub async fn start_worker(
    server_name: &str,
    functions: Vec<Box<dyn FunctionBuilder>>,
) -> TestWorker {
    let transport = MockTransport::new(100);
    let state = Arc::new(GlobalState::new(
        transport.clone() as Arc<dyn EventTransport>,
        server_name,
        100,
    ));
    state.dispatcher.start(4);

    for builder in functions {
        let mut function = builder.build();
        function.set_server(server_name);
        function.set_cache(state.cache.clone() as _);
        let key = function_key(server_name, function.name(), function.version());
        state.functions.store(key, Arc::from(function));
    }

    handlers::register_handlers(&state);
    handlers::spawn_inbound_pump(&state).expect("inbound sequence already taken");

    let inbound = transport.inbound();
    TestWorker {
        state,
        transport,
        inbound,
    }
}

/// Waits for the next outbound event matching the predicate.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<EventMessage>,
    deadline: Duration,
    mut predicate: impl FnMut(&EventMessage) -> bool,
) -> Option<EventMessage> {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::time::timeout(deadline, wait).await.ok()
}
