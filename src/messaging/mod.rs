//! # Messaging Module
//!
//! The domain event model for the workflow stream and the correlation
//! router that multiplexes request/response pairs over it.

pub mod correlation;
pub mod message;

pub use correlation::{CorrelationRouter, ResponseSlot};
pub use message::{correlation_id, EventMessage, Meta};
