//! # Worker Configuration
//!
//! Options for the worker server, resolved from built-in defaults, the
//! process environment, and builder-style overrides. Explicit overrides
//! win over environment values, which win over defaults.

use crate::constants::defaults;

/// Configuration for the worker server.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Logical worker name advertised to the workflow server.
    pub server_name: String,
    /// Optional path to an extra environment file loaded at startup.
    pub env_path: String,
    /// Communication mode; the stream transport is gRPC-only, so this is
    /// forced to `grpc` at startup.
    pub communication_mode: String,
    /// Address of the workflow event stream server.
    pub grpc_server_address: String,
    /// API token attached to the stream handshake; empty disables auth.
    pub server_api_token: String,
    /// Number of dispatcher workers.
    pub handlers_concurrency: usize,
    /// Capacity of the inbound event buffer (and the dispatcher queue).
    pub incoming_events_buffer: usize,
    /// Seconds between connection attempts while disconnected.
    pub reconnect_interval_secs: u64,
    /// Seconds between connection health checks.
    pub healthcheck_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_name: defaults::SERVER_NAME.to_string(),
            env_path: String::new(),
            communication_mode: defaults::COMMUNICATION_MODE.to_string(),
            grpc_server_address: defaults::GRPC_SERVER_ADDRESS.to_string(),
            server_api_token: String::new(),
            handlers_concurrency: defaults::HANDLERS_CONCURRENCY,
            incoming_events_buffer: defaults::INCOMING_EVENTS_BUFFER,
            reconnect_interval_secs: defaults::RECONNECT_INTERVAL_SECS,
            healthcheck_interval_secs: defaults::HEALTHCHECK_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Builds a configuration from defaults overridden by the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_environment();
        config
    }

    /// Overrides fields still at their built-in defaults with environment
    /// values. Called again after environment files load so file-provided
    /// variables take effect without clobbering explicit options.
    pub(crate) fn apply_environment(&mut self) {
        if self.server_name == defaults::SERVER_NAME {
            if let Some(name) = non_empty_env("SERVER_NAME") {
                self.server_name = name;
            }
        }
        if self.env_path.is_empty() {
            if let Some(path) = non_empty_env("CODEX_ENV_PATH") {
                self.env_path = path;
            }
        }
        if self.communication_mode == defaults::COMMUNICATION_MODE {
            if let Some(mode) = non_empty_env("COMMUNICATION_MODE") {
                self.communication_mode = mode;
            }
        }
        if self.grpc_server_address == defaults::GRPC_SERVER_ADDRESS {
            if let Some(address) = non_empty_env("GRPC_SERVER_ADDRESS") {
                self.grpc_server_address = address;
            }
        }
        if self.server_api_token.is_empty() {
            if let Some(token) = non_empty_env("SERVER_API_TOKEN") {
                self.server_api_token = token;
            }
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_env_path(mut self, path: impl Into<String>) -> Self {
        self.env_path = path.into();
        self
    }

    /// The stream transport is gRPC-only; any requested mode is coerced.
    pub fn with_communication_mode(mut self, _mode: impl Into<String>) -> Self {
        self.communication_mode = defaults::COMMUNICATION_MODE.to_string();
        self
    }

    pub fn with_grpc_server_address(mut self, address: impl Into<String>) -> Self {
        self.grpc_server_address = address.into();
        self
    }

    pub fn with_server_api_token(mut self, token: impl Into<String>) -> Self {
        self.server_api_token = token.into();
        self
    }

    pub fn with_handlers_concurrency(mut self, concurrency: usize) -> Self {
        self.handlers_concurrency = concurrency.max(1);
        self
    }

    pub fn with_incoming_events_buffer(mut self, buffer: usize) -> Self {
        self.incoming_events_buffer = buffer.max(1);
        self
    }

    pub fn with_reconnect_interval_secs(mut self, secs: u64) -> Self {
        self.reconnect_interval_secs = secs.max(1);
        self
    }

    pub fn with_healthcheck_interval_secs(mut self, secs: u64) -> Self {
        self.healthcheck_interval_secs = secs.max(1);
        self
    }

    /// The subset of options consumed by the stream transport.
    pub fn communication(&self) -> CommunicationConfig {
        CommunicationConfig {
            server_name: self.server_name.clone(),
            grpc_server_address: self.grpc_server_address.clone(),
            server_api_token: self.server_api_token.clone(),
            incoming_buffer: self.incoming_events_buffer,
            reconnect_interval_secs: self.reconnect_interval_secs,
            healthcheck_interval_secs: self.healthcheck_interval_secs,
        }
    }
}

/// Transport-facing configuration extracted from [`WorkerConfig`].
#[derive(Debug, Clone)]
pub struct CommunicationConfig {
    pub server_name: String,
    pub grpc_server_address: String,
    pub server_api_token: String,
    pub incoming_buffer: usize,
    pub reconnect_interval_secs: u64,
    pub healthcheck_interval_secs: u64,
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
