//! # Wire Protocol Module
//!
//! Message types and the streaming client for the `Events` bidirectional
//! stream. The message schema is owned by the workflow server; the prost
//! types here mirror it field-for-field so the worker interoperates with
//! the rest of the fleet without a protoc build step.

mod convert;

pub use convert::{from_wire, to_wire};

/// Wire form of an event message.
///
/// All scalar fields are UTF-8 strings; `meta` is a dynamic structured
/// value preserving JSON-representable types; `payload` is an opaque byte
/// sequence where empty means absent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcEventMessage {
    #[prost(string, tag = "1")]
    pub function: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub node: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub workflow: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub version: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub server: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub event: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub text: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub run: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "9")]
    pub meta: ::core::option::Option<::prost_types::Struct>,
    #[prost(bytes = "vec", tag = "10")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "11")]
    pub correlation_id: ::prost::alloc::string::String,
}

/// Client for the event stream service.
///
/// Exposes the single `Events` bidirectional streaming RPC; both
/// directions carry [`GrpcEventMessage`].
#[derive(Debug, Clone)]
pub struct EventServiceClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl EventServiceClient<tonic::transport::Channel> {
    pub fn new(channel: tonic::transport::Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Opens the bidirectional event stream.
    pub async fn events(
        &mut self,
        request: impl tonic::IntoStreamingRequest<Message = GrpcEventMessage>,
    ) -> std::result::Result<
        tonic::Response<tonic::codec::Streaming<GrpcEventMessage>>,
        tonic::Status,
    > {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("Service was not ready: {e}"))
        })?;
        let codec = tonic::codec::ProstCodec::default();
        let path = tonic::codegen::http::uri::PathAndQuery::from_static(
            "/workflows.EventService/Events",
        );
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
