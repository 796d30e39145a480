//! Remote function-result cache over the event stream.
//!
//! Keys are 64-bit unsigned integers rendered as decimal strings on the
//! wire. Reads are correlated request/response pairs; writes are
//! fire-and-forget `cache_set` events carrying the TTL in seconds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::client::DEFAULT_TIMEOUT_SECS;
use crate::constants::events;
use crate::error::ClientError;
use crate::function::FunctionCache;
use crate::messaging::{correlation_id, CorrelationRouter, EventMessage, Meta};
use crate::transport::EventTransport;

/// Cache client backed by the workflow server.
pub struct CacheClient {
    transport: Arc<dyn EventTransport>,
    router: CorrelationRouter,
    default_timeout: Duration,
    server_name: String,
}

impl CacheClient {
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

    /// Requests a cache value by string key, waiting for the correlated
    /// `cache_get_response`.
    pub async fn get_by_string(&self, key: &str) -> Result<Vec<u8>, ClientError> {
        let correlation = correlation_id();
        let slot = self.router.register(&correlation, 1);

        let mut meta = Meta::new();
        meta.insert("Key".to_string(), json!(key));
        meta.insert("calling_server".to_string(), json!(self.server_name));

        let event = EventMessage {
            event: events::CACHE_GET_REQUEST.to_string(),
            text: "Cache get request".to_string(),
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

    /// Requests a cache value by numeric key.
    pub async fn get_u64(&self, key: u64) -> Result<Vec<u8>, ClientError> {
        self.get_by_string(&key.to_string()).await
    }

    /// Stores a cache value by string key with a TTL in seconds.
    /// Fire-and-forget: no response is awaited.
    pub async fn set_by_string(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: i64,
    ) -> Result<(), ClientError> {
        // Copy so the caller mutating its buffer after send cannot change
        // the bytes on the wire.
        let payload = value.to_vec();

        let mut meta = Meta::new();
        meta.insert("Key".to_string(), json!(key));
        meta.insert("TTL".to_string(), json!(ttl_seconds));
        meta.insert("calling_server".to_string(), json!(self.server_name));

        let event = EventMessage {
            event: events::CACHE_SET.to_string(),
            text: "Cache set".to_string(),
            meta: Some(meta),
            payload: Some(payload),
            correlation_id: correlation_id(),
            ..Default::default()
        };
        self.transport.send_event(&event).await?;
        Ok(())
    }

    /// Stores a cache value by numeric key with a duration TTL.
    pub async fn set_u64(&self, key: u64, value: &[u8], ttl: Duration) -> Result<(), ClientError> {
        self.set_by_string(&key.to_string(), value, ttl.as_secs() as i64)
            .await
    }

    /// Delivers cache response events to the waiting caller by
    /// correlation id. All other events are ignored.
    pub fn handle_response(&self, response: &EventMessage) {
        if response.event != events::CACHE_GET_RESPONSE
            && response.event != events::CACHE_SET_RESPONSE
        {
            return;
        }
        debug!(correlation_id = %response.correlation_id, "Delivering cache response");
        self.router.deliver(&response.correlation_id, response.clone());
    }
}

#[async_trait]
impl FunctionCache for CacheClient {
    async fn get(&self, key: u64) -> Option<Vec<u8>> {
        match self.get_u64(key).await {
            Ok(data) if !data.is_empty() => Some(data),
            // Read failures are a miss; the cache is best-effort.
            _ => None,
        }
    }

    async fn set(&self, key: u64, value: &[u8]) -> Result<(), ClientError> {
        self.set_u64(key, value, Duration::ZERO).await
    }

    async fn set_with_ttl(&self, key: u64, value: &[u8], ttl: Duration) -> Result<(), ClientError> {
        self.set_u64(key, value, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::RecordingTransport;

    #[tokio::test]
    async fn get_sends_request_and_returns_delivered_payload() {
        let transport = RecordingTransport::new();
        let cache = Arc::new(CacheClient::new(transport.clone(), "w1"));
        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_u64(42).await })
        };

        let request = transport
            .wait_for(|e| e.event == events::CACHE_GET_REQUEST)
            .await;
        let meta = request.meta.clone().unwrap();
        assert_eq!(meta.get("Key"), Some(&json!("42")));
        assert_eq!(meta.get("calling_server"), Some(&json!("w1")));
        assert!(!request.correlation_id.is_empty());

        cache.handle_response(&EventMessage {
            event: events::CACHE_GET_RESPONSE.to_string(),
            payload: Some(b"cached".to_vec()),
            correlation_id: request.correlation_id,
            ..Default::default()
        });

        assert_eq!(waiter.await.unwrap().unwrap(), b"cached".to_vec());
    }

    #[tokio::test]
    async fn get_times_out_as_error() {
        let transport = RecordingTransport::new();
        let cache = CacheClient::new(transport, "w1")
            .with_timeout(Duration::from_millis(20));
        let err = cache.get_u64(7).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }

    #[tokio::test]
    async fn empty_response_payload_is_a_miss() {
        let transport = RecordingTransport::new();
        let cache = Arc::new(
            CacheClient::new(transport.clone(), "w1").with_timeout(Duration::from_secs(2)),
        );

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(9).await })
        };

        let request = transport
            .wait_for(|e| e.event == events::CACHE_GET_REQUEST)
            .await;
        cache.handle_response(&EventMessage {
            event: events::CACHE_GET_RESPONSE.to_string(),
            correlation_id: request.correlation_id,
            ..Default::default()
        });

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_is_fire_and_forget_with_ttl_meta() {
        let transport = RecordingTransport::new();
        let cache = CacheClient::new(transport.clone(), "w1");

        cache
            .set_u64(42, b"value", Duration::from_secs(60))
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, events::CACHE_SET);
        let meta = sent[0].meta.clone().unwrap();
        assert_eq!(meta.get("Key"), Some(&json!("42")));
        assert_eq!(meta.get("TTL"), Some(&json!(60)));
        assert_eq!(sent[0].payload, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn set_copies_the_payload_defensively() {
        let transport = RecordingTransport::new();
        let cache = CacheClient::new(transport.clone(), "w1");

        let mut buffer = b"original".to_vec();
        cache
            .set_u64(1, &buffer, Duration::from_secs(1))
            .await
            .unwrap();
        buffer.copy_from_slice(b"mutated!");

        let sent = transport.sent();
        assert_eq!(sent[0].payload, Some(b"original".to_vec()));
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let transport = RecordingTransport::new();
        let cache = CacheClient::new(transport, "w1");
        // Delivering a non-cache event must not panic or register
        // anything.
        cache.handle_response(&EventMessage {
            event: events::FUNCTION_RESPONSE.to_string(),
            correlation_id: "c1".into(),
            ..Default::default()
        });
    }
}
