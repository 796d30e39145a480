//! Event message model for the workflow stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Free-form metadata attached to an event, preserving JSON-representable
/// values only.
pub type Meta = HashMap<String, serde_json::Value>;

/// The single transport unit carried in both directions on the workflow
/// stream.
///
/// `function`, `version`, and `server` identify the invocation target;
/// `node`, `workflow`, and `run` are trace identifiers attached by the
/// workflow server; `event` discriminates the message against the closed
/// set in [`crate::constants::events`]. Requests that expect a response
/// carry a non-empty `correlation_id`, and responses echo it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub workflow: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub correlation_id: String,
}

/// Generates a short random correlation id in the format `d83a-f68e`.
///
/// Two random 16-bit values rendered as hex; uniqueness is probabilistic
/// and the router overwrites any prior registration on collision.
pub fn correlation_id() -> String {
    format!("{:04x}-{:04x}", rand::random::<u16>(), rand::random::<u16>())
}
