//! # System Constants
//!
//! Event names, registry key helpers, and configuration defaults shared by
//! the worker runtime. The event-name strings and the function key format
//! are part of the wire contract with the workflow server and must stay
//! stable across worker implementations.

/// Events carried on the workflow stream.
///
/// The stream carries a closed set of event names; both directions use the
/// same message shape and discriminate on these strings.
pub mod events {
    // Connection lifecycle
    pub const CLIENT_REGISTRATION: &str = "client_registration";

    // Function invocation
    pub const FUNCTION_REQUEST: &str = "function_request";
    pub const FUNCTION_RESPONSE: &str = "function_response";
    pub const FLOW_NODE_REQUEST: &str = "flow_node_request";

    // Lifecycle / diagnostics
    pub const STATUS_MESSAGE: &str = "status_message";
    pub const ERROR: &str = "error";

    // Introspection request/response pairs
    pub const REQUEST_LIST_FUNCTIONS: &str = "request_list_functions";
    pub const RESPONSE_LIST_FUNCTIONS: &str = "response_list_functions";
    pub const REQUEST_SERVER_NAME: &str = "request_server_name";
    pub const RESPONSE_SERVER_NAME: &str = "response_server_name";
    pub const REQUEST_SERVER_INFO: &str = "request_server_info";

    // Remote function-result cache
    pub const CACHE_GET_REQUEST: &str = "cache_get_request";
    pub const CACHE_GET_RESPONSE: &str = "cache_get_response";
    pub const CACHE_SET: &str = "cache_set";
    pub const CACHE_SET_RESPONSE: &str = "cache_set_response";

    // Remote workflow-scoped key-value store
    pub const STORE_GET_REQUEST: &str = "store_get_request";
    pub const STORE_GET_RESPONSE: &str = "store_get_response";
    pub const STORE_SET_REQUEST: &str = "store_set_request";
    pub const STORE_SET_RESPONSE: &str = "store_set_response";
}

/// Prefix for canonical function registry keys.
pub const FUNCTION_PREFIX: &str = "function:";

/// Returns the canonical registry key for a function entry.
///
/// Kept stable for cross-worker consistency: every worker in the fleet
/// derives the same key for the same `(server, name, version)` triple.
pub fn function_key(server: &str, name: &str, version: &str) -> String {
    format!("{FUNCTION_PREFIX}{server}:{name}:{version}")
}

/// Built-in configuration defaults, overridable via environment or options.
pub mod defaults {
    pub const SERVER_NAME: &str = "codex-go-worker";
    pub const COMMUNICATION_MODE: &str = "grpc";
    pub const GRPC_SERVER_ADDRESS: &str = "localhost:50051";
    pub const HANDLERS_CONCURRENCY: usize = 8;
    pub const INCOMING_EVENTS_BUFFER: usize = 100;
    pub const RECONNECT_INTERVAL_SECS: u64 = 5;
    pub const HEALTHCHECK_INTERVAL_SECS: u64 = 30;
}
