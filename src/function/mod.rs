//! # Function Module
//!
//! Typed, versioned functions advertised to the workflow server. A
//! [`Function`] pairs an input/output shape with an async handler; its
//! flattened schemas are derived at construction so the workflow server
//! can introspect the catalog. Execution optionally memoizes results
//! through the shared [`FunctionCache`] capability.

pub mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FunctionError;
use crate::hash;
use crate::messaging::EventMessage;
use crate::state::GlobalState;

/// Descriptive catalog entry for a registered function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Flattened input schema as a JSON object string.
    pub inputs_type: String,
    /// Flattened output schema as a JSON object string.
    pub outputs_type: String,
    pub server: String,
    pub tags: Vec<String>,
}

/// Cache capability for memoized function results, backed by the workflow
/// server's remote cache.
#[async_trait]
pub trait FunctionCache: Send + Sync {
    /// Returns the cached bytes for a key, or `None` on a miss.
    async fn get(&self, key: u64) -> Option<Vec<u8>>;

    /// Stores bytes under a key with server-default expiry.
    async fn set(&self, key: u64, value: &[u8]) -> Result<(), crate::error::ClientError>;

    /// Stores bytes under a key with an explicit time-to-live.
    async fn set_with_ttl(
        &self,
        key: u64,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), crate::error::ClientError>;
}

/// A registered function as seen by the runtime.
#[async_trait]
pub trait WorkerFunction: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn definition(&self) -> FunctionDefinition;

    /// Injects the logical worker name into the definition.
    fn set_server(&mut self, server: &str);

    /// Attaches the shared cache capability.
    fn set_cache(&mut self, cache: Arc<dyn FunctionCache>);

    /// Sets the memoization TTL; zero disables caching entirely.
    fn set_cache_ttl(&mut self, ttl: Duration);

    /// Executes the function against raw JSON input bytes, returning raw
    /// JSON output bytes.
    async fn execute(
        &self,
        inputs: Option<&[u8]>,
        message: &EventMessage,
        state: Arc<GlobalState>,
    ) -> Result<Vec<u8>, FunctionError>;
}

/// Builds a registry entry from a configured function value.
pub trait FunctionBuilder: Send + Sync {
    fn build(&self) -> Box<dyn WorkerFunction>;
}

type HandlerFuture<Out> =
    Pin<Box<dyn Future<Output = Result<Out, FunctionError>> + Send>>;
type Handler<In, Out> =
    dyn Fn(In, EventMessage, Arc<GlobalState>) -> HandlerFuture<Out> + Send + Sync;

/// A typed function with an async handler.
///
/// Construct with [`Function::new`], then chain `with_handler`,
/// `with_tags`, and `with_cache_ttl` before registering it on the server.
pub struct Function<In, Out> {
    definition: FunctionDefinition,
    handler: Arc<Handler<In, Out>>,
    cache: Option<Arc<dyn FunctionCache>>,
    ttl: Duration,
}

impl<In, Out> Function<In, Out>
where
    In: DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    Out: Serialize + schemars::JsonSchema + Send + Sync + 'static,
{
    /// Creates a function, deriving the input/output schemas from the
    /// type parameters.
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            definition: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                version: version.to_string(),
                inputs_type: schema::type_schema_json::<In>(),
                outputs_type: schema::type_schema_json::<Out>(),
                server: String::new(),
                tags: Vec::new(),
            },
            handler: Arc::new(|_, _, _| {
                Box::pin(async { Err(FunctionError::Handler("no handler configured".into())) })
            }),
            cache: None,
            // Zero disables caching.
            ttl: Duration::ZERO,
        }
    }

    /// Sets the handler. It receives the typed input, the inbound event
    /// message, and the shared worker state.
    pub fn with_handler<F, Fut, E>(mut self, handler: F) -> Self
    where
        F: Fn(In, EventMessage, Arc<GlobalState>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        self.handler = Arc::new(move |input, message, state| {
            let fut = handler(input, message, state);
            Box::pin(async move { fut.await.map_err(|e| FunctionError::Handler(e.to_string())) })
        });
        self
    }

    /// Sets a handler that only needs the typed input.
    pub fn with_simple_handler<F, Fut, E>(self, handler: F) -> Self
    where
        F: Fn(In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        self.with_handler(move |input, _message, _state| handler(input))
    }

    /// Adds tags for categorization and filtering.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the per-function cache TTL. Zero disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl<In, Out> Clone for Function<In, Out> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            handler: Arc::clone(&self.handler),
            cache: self.cache.clone(),
            ttl: self.ttl,
        }
    }
}

#[async_trait]
impl<In, Out> WorkerFunction for Function<In, Out>
where
    In: DeserializeOwned + Send + Sync + 'static,
    Out: Serialize + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn version(&self) -> &str {
        &self.definition.version
    }

    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    fn set_server(&mut self, server: &str) {
        self.definition.server = server.to_string();
    }

    fn set_cache(&mut self, cache: Arc<dyn FunctionCache>) {
        self.cache = Some(cache);
    }

    fn set_cache_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    async fn execute(
        &self,
        inputs: Option<&[u8]>,
        message: &EventMessage,
        state: Arc<GlobalState>,
    ) -> Result<Vec<u8>, FunctionError> {
        let raw = inputs.unwrap_or_default();
        let name = &self.definition.name;
        let version = &self.definition.version;

        // TTL of zero disables caching entirely: no lookup, no store.
        let cache = self.cache.as_ref().filter(|_| !self.ttl.is_zero());
        let key = cache.map(|_| hash::cache_key(raw, name, version));

        if let (Some(cache), Some(key)) = (cache, key) {
            debug!(function = %name, version = %version, key, "Cache lookup");
            if let Some(hit) = cache.get(key).await {
                debug!(function = %name, version = %version, key, "Cache hit");
                return Ok(hit);
            }
            debug!(function = %name, version = %version, key, "Cache miss");
        }

        let input: In = serde_json::from_slice(raw).map_err(FunctionError::Decode)?;
        let output = (self.handler)(input, message.clone(), state).await?;
        let bytes = serde_json::to_vec(&output).map_err(FunctionError::Encode)?;

        if let (Some(cache), Some(key)) = (cache, key) {
            let stored = if self.ttl > Duration::ZERO {
                cache.set_with_ttl(key, &bytes, self.ttl).await
            } else {
                cache.set(key, &bytes).await
            };
            match stored {
                // The cache is an optimization; store failures are logged
                // and swallowed.
                Err(e) => warn!(function = %name, key, "Failed to store result in cache: {e}"),
                Ok(()) => debug!(function = %name, key, ttl_secs = self.ttl.as_secs(), "Cache store"),
            }
        }

        Ok(bytes)
    }
}

impl<In, Out> FunctionBuilder for Function<In, Out>
where
    In: DeserializeOwned + schemars::JsonSchema + Send + Sync + 'static,
    Out: Serialize + schemars::JsonSchema + Send + Sync + 'static,
{
    fn build(&self) -> Box<dyn WorkerFunction> {
        Box::new(self.clone())
    }
}
