//! Domain layer for tunnel-client.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes.  The relay event types and the request/item
//! model live in `tunnel-core`; what is specific to this binary is its
//! configuration.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `reqwest`, or WebSocket types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;

// Re-export so callers can write `domain::TunnelConfig`.
pub use config::{ConfigError, Credentials, TunnelConfig};
