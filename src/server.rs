//! # Worker Server
//!
//! The facade that assembles the runtime: environment loading,
//! configuration, the stream transport, the correlated clients, the
//! dispatcher, function registration, the startup broadcasts, and the
//! inbound pump. `start` blocks until shutdown.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::constants::{defaults, function_key};
use crate::error::{Result, WorkerError};
use crate::function::FunctionBuilder;
use crate::handlers;
use crate::logging;
use crate::state::{EventState, GlobalState};
use crate::transport::{EventTransport, GrpcTransport};

/// A worker server advertising typed functions to the workflow server.
///
/// # Examples
///
/// ```rust,ignore
/// use codex_worker::{Function, Server, WorkerConfig};
///
/// #[tokio::main]
/// async fn main() -> codex_worker::Result<()> {
///     let config = WorkerConfig::from_env().with_server_name("rust-worker");
///     let mut server = Server::new(config);
///     server.register_function(
///         Function::<GreetInput, GreetOutput>::new("greet", "1.0.0", "Greets the caller")
///             .with_simple_handler(|input: GreetInput| async move {
///                 Ok::<_, String>(GreetOutput { message: format!("Hello, {}!", input.name) })
///             }),
///     );
///     server.start().await
/// }
/// ```
pub struct Server {
    config: WorkerConfig,
    functions: Vec<Box<dyn FunctionBuilder>>,
    global_state: Option<Arc<GlobalState>>,
}

impl Server {
    /// Creates a server with the given configuration.
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            functions: Vec::new(),
            global_state: None,
        }
    }

    /// Adds a function to the catalog. Functions are built and published
    /// when the server starts.
    pub fn register_function(&mut self, function: impl FunctionBuilder + 'static) {
        self.functions.push(Box::new(function));
    }

    /// The resolved configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The shared state, available once the server has started.
    pub fn global_state(&self) -> Option<&Arc<GlobalState>> {
        self.global_state.as_ref()
    }

    /// Starts the worker and blocks until shutdown.
    ///
    /// Never returns under normal operation; an error indicates an
    /// unrecoverable initialisation failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown signal handler cannot be
    /// installed.
    pub async fn start(&mut self) -> Result<()> {
        logging::init_logging();
        info!(server_name = %self.config.server_name, "Starting worker server");

        self.load_environment();
        self.config.apply_environment();
        // The event plane is gRPC-only.
        self.config.communication_mode = defaults::COMMUNICATION_MODE.to_string();

        let transport = Arc::new(GrpcTransport::new(self.config.communication()));
        Arc::clone(&transport).connect();

        let state = Arc::new(GlobalState::new(
            transport as Arc<dyn EventTransport>,
            &self.config.server_name,
            self.config.incoming_events_buffer,
        ));
        state.dispatcher.start(self.config.handlers_concurrency);

        self.build_functions(&state);

        // Announce the worker before serving: name and catalog with an
        // empty envelope, then the startup catalog broadcast. Sends fail
        // soft while the connection is still coming up.
        let registration = EventState::registration(&state.server_name);
        handlers::send_server_name(&state, &registration).await;
        handlers::send_function_list(&state, &registration).await;
        info!(server_name = %state.server_name, "Worker registered with workflow server");

        handlers::send_function_list(&state, &EventState::startup(&state.server_name)).await;
        info!("Startup function list broadcast sent");

        handlers::register_handlers(&state);
        let pump = handlers::spawn_inbound_pump(&state);
        self.global_state = Some(Arc::clone(&state));
        info!("Stream listeners activated, server running");

        tokio::signal::ctrl_c().await.map_err(|e| {
            WorkerError::Configuration(format!("failed to install signal handler: {e}"))
        })?;

        info!("Shutdown signal received, stopping worker");
        state.transport.close().await;
        state.dispatcher.stop().await;
        if let Some(pump) = pump {
            let _ = pump.await;
        }
        info!("Shutdown complete");
        Ok(())
    }

    /// Loads `.env` and the optional extra environment file. Both are
    /// soft failures: containerized deployments provide real environment
    /// variables instead.
    fn load_environment(&self) {
        if dotenvy::dotenv().is_err() {
            info!("No .env file found, assuming container environment");
        }

        if self.config.env_path.is_empty() {
            info!("CODEX_ENV_PATH is not set, assuming container environment");
        } else if dotenvy::from_path(&self.config.env_path).is_err() {
            warn!(path = %self.config.env_path, "Could not load environment file");
        }
    }

    /// Builds each registered function, injects the worker name, attaches
    /// the cache capability, and stores it under its canonical key.
    fn build_functions(&self, state: &Arc<GlobalState>) {
        for builder in &self.functions {
            let mut function = builder.build();
            function.set_server(&state.server_name);
            function.set_cache(Arc::clone(&state.cache) as _);

            let key = function_key(&state.server_name, function.name(), function.version());
            state.functions.store(key, Arc::from(function));
        }
        info!(count = state.functions.len(), "Registered functions");
    }
}
