//! # Worker Error Types
//!
//! Error enums for the transport, function execution, and correlated client
//! layers, plus the top-level [`WorkerError`] wrapper used by the server
//! facade.

use thiserror::Error;

/// Errors raised by the event transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A send was attempted without a live stream.
    #[error("not connected to workflow server")]
    NotConnected,

    /// The stream handshake was rejected by the server.
    #[error("authentication rejected by workflow server: {0}")]
    Unauthenticated(String),

    /// The server could not be reached.
    #[error("failed to reach workflow server at {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// A stream-level write failed; the transport will reconnect.
    #[error("failed to send event: {0}")]
    SendFailed(String),

    /// A message could not be converted between its wire and domain
    /// forms.
    #[error("wire conversion failed: {0}")]
    ConversionFailed(String),
}

/// Errors raised while executing a registered function.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// The inbound payload could not be decoded into the input type.
    #[error("failed to decode function input: {0}")]
    Decode(#[source] serde_json::Error),

    /// The function output could not be encoded to JSON.
    #[error("failed to encode function output: {0}")]
    Encode(#[source] serde_json::Error),

    /// The user handler returned an error.
    #[error("handler error: {0}")]
    Handler(String),

    /// No function is registered under the requested key.
    #[error("Function not found: {key}")]
    NotFound { key: String },
}

/// Errors raised by the correlated RPC, cache, and store clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The correlated wait expired before a response arrived.
    #[error("timed out waiting for response")]
    Timeout,

    /// A response arrived without the required payload.
    #[error("received empty payload")]
    EmptyResponse,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error for server startup and operation.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
