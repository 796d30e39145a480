//! # Event Dispatcher
//!
//! A bounded FIFO queue of inbound messages plus a fixed pool of workers
//! that route each message to the handler registered for its event name.
//! `dispatch` blocks when the queue is full so back-pressure propagates to
//! the inbound pump; per-event ordering across workers is not guaranteed,
//! which is safe because responses are matched by correlation id.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::messaging::EventMessage;
use crate::registry::SafeRegistry;

/// Handler invoked for a dispatched event.
pub type EventHandler =
    Arc<dyn Fn(EventMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Routes events to registered handlers and executes them on a worker
/// pool.
pub struct Dispatcher {
    handlers: Arc<SafeRegistry<String, EventHandler>>,
    jobs_tx: Mutex<Option<mpsc::Sender<EventMessage>>>,
    jobs_rx: Mutex<Option<mpsc::Receiver<EventMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Creates a dispatcher with a bounded queue of the given size.
    pub fn new(queue_size: usize) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(queue_size.max(1));
        Self {
            handlers: Arc::new(SafeRegistry::new()),
            jobs_tx: Mutex::new(Some(jobs_tx)),
            jobs_rx: Mutex::new(Some(jobs_rx)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Associates an event name with a handler. Called before `start`.
    pub fn register<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |msg| Box::pin(handler(msg)));
        self.handlers.store(event.to_string(), handler);
    }

    /// Launches `concurrency` workers to process queued events.
    pub fn start(&self, concurrency: usize) {
        let Some(jobs_rx) = lock(&self.jobs_rx).take() else {
            warn!("Dispatcher already started");
            return;
        };
        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));

        let mut workers = lock(&self.workers);
        for _ in 0..concurrency.max(1) {
            let jobs_rx = Arc::clone(&jobs_rx);
            let handlers = Arc::clone(&self.handlers);
            workers.push(tokio::spawn(async move {
                loop {
                    let message = {
                        let mut rx = jobs_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(message) = message else { break };
                    match handlers.load(&message.event) {
                        Some(handler) => handler(message).await,
                        None => info!(event = %message.event, "No handler registered for event"),
                    }
                }
            }));
        }
    }

    /// Enqueues a message for processing, waiting while the queue is full.
    pub async fn dispatch(&self, message: EventMessage) {
        let sender = lock(&self.jobs_tx).clone();
        match sender {
            Some(sender) => {
                if sender.send(message).await.is_err() {
                    warn!("Dispatcher queue closed, dropping message");
                }
            }
            None => warn!("Dispatcher stopped, dropping message"),
        }
    }

    /// Closes the queue and waits for workers to drain it.
    pub async fn stop(&self) {
        lock(&self.jobs_tx).take();
        let workers = std::mem::take(&mut *lock(&self.workers));
        for worker in workers {
            let _ = worker.await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn event(name: &str) -> EventMessage {
        EventMessage {
            event: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn routes_events_to_registered_handler() {
        let dispatcher = Dispatcher::new(8);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        dispatcher.register("function_request", move |_msg| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        dispatcher.start(2);

        for _ in 0..5 {
            dispatcher.dispatch(event("function_request")).await;
        }
        dispatcher.stop().await;

        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn unknown_events_are_discarded() {
        let dispatcher = Dispatcher::new(4);
        dispatcher.register("known", |_msg| async {});
        dispatcher.start(1);

        dispatcher.dispatch(event("unknown")).await;
        dispatcher.dispatch(event("known")).await;
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn workers_process_concurrently() {
        let dispatcher = Dispatcher::new(8);
        let (done_tx, mut done_rx) = mpsc::channel(8);

        dispatcher.register("slow", move |_msg| {
            let done_tx = done_tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = done_tx.send(()).await;
            }
        });
        dispatcher.start(4);

        let started = std::time::Instant::now();
        for _ in 0..4 {
            dispatcher.dispatch(event("slow")).await;
        }
        for _ in 0..4 {
            done_rx.recv().await.unwrap();
        }
        // Four 50ms handlers on four workers overlap.
        assert!(started.elapsed() < Duration::from_millis(190));
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn dispatch_after_stop_drops_message() {
        let dispatcher = Dispatcher::new(2);
        dispatcher.start(1);
        dispatcher.stop().await;
        dispatcher.dispatch(event("anything")).await;
    }
}
