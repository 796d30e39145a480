//! # Codex Worker SDK
//!
//! Worker-side runtime for the Codex workflow platform. A worker joins
//! the workflow server over a single long-lived bidirectional gRPC event
//! stream, advertises a catalog of typed functions, and serves
//! function-invocation requests concurrently while issuing correlated
//! sub-requests (peer function calls, remote cache reads/writes, remote
//! key-value store reads/writes) over the same stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use codex_worker::{Function, Server, WorkerConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, schemars::JsonSchema)]
//! struct Input { text: String }
//!
//! #[derive(Serialize, Deserialize, schemars::JsonSchema)]
//! struct Output { output: String }
//!
//! #[tokio::main]
//! async fn main() -> codex_worker::Result<()> {
//!     let mut server = Server::new(WorkerConfig::from_env());
//!     server.register_function(
//!         Function::<Input, Output>::new("example_input", "1.0.0", "Echoes its input")
//!             .with_simple_handler(|input: Input| async move {
//!                 Ok::<_, String>(Output { output: input.text })
//!             }),
//!     );
//!     server.start().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod function;
pub mod handlers;
pub mod hash;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod proto;
pub mod registry;
pub mod server;
pub mod state;
pub mod transport;

pub use config::WorkerConfig;
pub use error::{ClientError, FunctionError, Result, TransportError, WorkerError};
pub use function::{Function, FunctionBuilder, FunctionCache, FunctionDefinition};
pub use messaging::EventMessage;
pub use server::Server;
pub use state::{EventState, GlobalState};
