//! gRPC implementation of the event transport.
//!
//! Connection lifecycle: a background loop attempts to connect on a fixed
//! cadence until successful; a monitor task coalesces reconnect signals
//! from the send and receive paths and from periodic health checks, tears
//! the connection down, and restarts the loop. Send and receive never
//! block each other; inbound messages are published to a bounded buffer
//! that drops the newest message when full.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{debug, error, info, warn};

use crate::config::CommunicationConfig;
use crate::constants::events;
use crate::error::TransportError;
use crate::messaging::EventMessage;
use crate::proto::{from_wire, to_wire, EventServiceClient, GrpcEventMessage};
use crate::transport::EventTransport;

/// Cap on a single connection establishment attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound queue between `send_event` callers and the stream writer.
const OUTBOUND_BUFFER: usize = 16;

struct ConnState {
    outbound: Option<mpsc::Sender<GrpcEventMessage>>,
    channel: Option<Channel>,
}

/// Bidirectional gRPC stream client for the workflow server.
pub struct GrpcTransport {
    config: CommunicationConfig,
    connected: AtomicBool,
    closed: AtomicBool,
    state: RwLock<ConnState>,
    inbound_tx: Mutex<Option<mpsc::Sender<EventMessage>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<EventMessage>>>,
    reconnect_tx: mpsc::Sender<()>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GrpcTransport {
    pub fn new(config: CommunicationConfig) -> Self {
        let buffer = config.incoming_buffer.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        // One-slot channel so repeated reconnect signals coalesce.
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state: RwLock::new(ConnState {
                outbound: None,
                channel: None,
            }),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            reconnect_tx,
            reconnect_rx: Mutex::new(Some(reconnect_rx)),
            shutdown_tx,
        }
    }

    /// Starts connection attempts in the background and returns
    /// immediately; an unreachable server never blocks the caller.
    pub fn connect(self: Arc<Self>) {
        let transport = Arc::clone(&self);
        tokio::spawn(async move { transport.connection_loop().await });

        let transport = Arc::clone(&self);
        tokio::spawn(async move { transport.connection_monitor().await });

        info!(
            address = %self.config.grpc_server_address,
            interval_secs = self.config.reconnect_interval_secs,
            "Started connection attempts to workflow server"
        );
    }

    /// Retries [`Self::attempt_connection`] on the configured cadence
    /// until it succeeds or the transport shuts down.
    async fn connection_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            match Arc::clone(&self).attempt_connection().await {
                Ok(()) => return,
                // An auth rejection deserves a louder diagnostic than an
                // unreachable server.
                Err(e @ TransportError::Unauthenticated(_)) => error!("{e}"),
                Err(e) => warn!("{e}"),
            }
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(Duration::from_secs(self.config.reconnect_interval_secs)) => {}
            }
        }
    }

    /// A single connection attempt: establish the channel, open the
    /// authenticated stream, queue the registration message, and start the
    /// receive loop.
    async fn attempt_connection(self: Arc<Self>) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let address = self.config.grpc_server_address.clone();
        info!(address = %address, "Attempting to connect to workflow server");

        if self.config.server_api_token.is_empty() {
            warn!("No API token provided; set SERVER_API_TOKEN for authentication");
        }

        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| TransportError::ConnectFailed {
                address: address.clone(),
                reason: format!("invalid address: {e}"),
            })?
            .connect_timeout(CONNECT_TIMEOUT);

        let channel = match tokio::time::timeout(CONNECT_TIMEOUT, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectFailed {
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectFailed {
                    address,
                    reason: "connection timeout".to_string(),
                });
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        // Registration is the first message on the new stream.
        let registration = GrpcEventMessage {
            server: self.config.server_name.clone(),
            event: events::CLIENT_REGISTRATION.to_string(),
            text: "Client registration".to_string(),
            ..Default::default()
        };
        if outbound_tx.try_send(registration).is_err() {
            return Err(TransportError::SendFailed(
                "failed to queue registration message".to_string(),
            ));
        }

        let mut request = tonic::Request::new(ReceiverStream::new(outbound_rx));
        if !self.config.server_api_token.is_empty() {
            let header = format!("Bearer {}", self.config.server_api_token);
            let value = header.parse::<MetadataValue<_>>().map_err(|e| {
                TransportError::Unauthenticated(format!(
                    "API token is not valid authorization metadata: {e}"
                ))
            })?;
            request.metadata_mut().insert("authorization", value);
        }

        let mut client = EventServiceClient::new(channel.clone());
        let inbound = match client.events(request).await {
            Ok(response) => response.into_inner(),
            Err(status) if status.code() == Code::Unauthenticated => {
                let reason = if self.config.server_api_token.is_empty() {
                    "no API token provided; set SERVER_API_TOKEN".to_string()
                } else {
                    format!("invalid or expired API token: {}", status.message())
                };
                return Err(TransportError::Unauthenticated(reason));
            }
            Err(status) => {
                return Err(TransportError::ConnectFailed {
                    address,
                    reason: format!("failed to open event stream: {status}"),
                });
            }
        };

        {
            let mut state = self.state.write().await;
            state.outbound = Some(outbound_tx);
            state.channel = Some(channel);
        }
        self.connected.store(true, Ordering::SeqCst);

        let transport = Arc::clone(&self);
        tokio::spawn(async move { transport.receive_loop(inbound).await });

        info!(
            address = %self.config.grpc_server_address,
            "Connected to workflow server"
        );
        Ok(())
    }

    /// Reads the stream until EOF, error, or shutdown, publishing each
    /// message to the inbound buffer.
    async fn receive_loop(
        self: Arc<Self>,
        mut inbound: tonic::codec::Streaming<GrpcEventMessage>,
    ) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                message = inbound.message() => match message {
                    Ok(Some(wire)) => match from_wire(wire) {
                        Ok(event) => {
                            debug!(event = %event.event, "Received event from workflow server");
                            self.publish_inbound(event);
                        }
                        Err(e) => warn!("Failed to convert inbound event: {e}"),
                    },
                    Ok(None) => {
                        info!("Event stream closed by server");
                        self.signal_reconnect();
                        return;
                    }
                    Err(status) => {
                        warn!("Error receiving event: {status}");
                        self.signal_reconnect();
                        return;
                    }
                }
            }
        }
    }

    fn publish_inbound(&self, event: EventMessage) {
        let sender = self
            .inbound_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(sender) = sender {
            offer_inbound(&sender, event);
        }
    }

    /// Coalesces reconnect signals and runs periodic health checks.
    async fn connection_monitor(self: Arc<Self>) {
        let mut reconnect_rx = match self
            .reconnect_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            Some(rx) => rx,
            // A monitor is already running.
            None => return,
        };

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(
            self.config.healthcheck_interval_secs,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                Some(()) = reconnect_rx.recv() => {
                    warn!("Connection lost, attempting to reconnect");
                    self.disconnect().await;
                    let transport = Arc::clone(&self);
                    tokio::spawn(async move { transport.connection_loop().await });
                }
                _ = ticker.tick() => self.check_connection_health().await,
            }
        }
    }

    /// Flags an unhealthy connection for the monitor. A dead stream writer
    /// while marked connected means the stream terminated without the
    /// receive loop noticing yet.
    async fn check_connection_health(&self) {
        if !self.is_connected() {
            return;
        }
        let unhealthy = {
            let state = self.state.read().await;
            match &state.outbound {
                Some(sender) => sender.is_closed(),
                None => true,
            }
        };
        if unhealthy {
            warn!("Connection unhealthy, triggering reconnection");
            self.signal_reconnect();
        }
    }

    fn signal_reconnect(&self) {
        // Full slot means a reconnect is already pending; drop the extra
        // signal.
        let _ = self.reconnect_tx.try_send(());
    }

    /// Tears down the current stream and channel.
    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut state = self.state.write().await;
        // Dropping the writer closes the stream in the send direction.
        state.outbound = None;
        state.channel = None;
    }
}

#[async_trait]
impl EventTransport for GrpcTransport {
    async fn send_event(&self, event: &EventMessage) -> Result<(), TransportError> {
        let outbound = {
            let state = self.state.read().await;
            if !self.is_connected() {
                return Err(TransportError::NotConnected);
            }
            state.outbound.clone().ok_or(TransportError::NotConnected)?
        };

        let wire = to_wire(event)?;
        if outbound.send(wire).await.is_err() {
            warn!(event = %event.event, "Failed to send event over stream, triggering reconnect");
            self.signal_reconnect();
            return Err(TransportError::SendFailed("event stream closed".to_string()));
        }

        debug!(event = %event.event, "Sent event to workflow server");
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EventMessage>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.disconnect().await;
        // Dropping the inbound sender ends the event sequence for the
        // consumer.
        self.inbound_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        info!("Transport closed");
    }
}

/// Publishes an inbound event, dropping the newest message when the buffer
/// is full. The workflow server assumes lossy delivery of observation-only
/// events; correlated responses remain best-effort and callers rely on
/// timeouts for liveness.
pub(crate) fn offer_inbound(sender: &mpsc::Sender<EventMessage>, event: EventMessage) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(event = %dropped.event, "Inbound event buffer full, dropping message");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
