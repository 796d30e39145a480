//! # Transport Module
//!
//! The bidirectional stream client for the workflow server. The transport
//! maintains exactly one logical stream, survives transient failures by
//! reconnecting in the background, and exposes inbound events as a bounded
//! sequence with a documented drop-newest policy under pressure.

mod grpc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::messaging::EventMessage;

pub use grpc::GrpcTransport;

/// Interface for communicating with the workflow server.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Sends an event to the workflow server.
    ///
    /// Fails with [`TransportError::NotConnected`] when there is no live
    /// stream. A stream-level failure triggers reconnection and is
    /// surfaced once to the caller; responses arrive out-of-band via the
    /// correlation router.
    async fn send_event(&self, event: &EventMessage) -> Result<(), TransportError>;

    /// Takes the inbound event sequence. Yields `None` after the first
    /// call; there is a single consumer.
    fn take_events(&self) -> Option<mpsc::Receiver<EventMessage>>;

    /// Instantaneous connection snapshot.
    fn is_connected(&self) -> bool;

    /// Idempotent shutdown: cancels background work, closes the stream in
    /// the send direction, and ends the inbound sequence.
    async fn close(&self);
}
