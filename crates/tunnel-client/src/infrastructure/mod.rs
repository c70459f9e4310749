//! Infrastructure layer for tunnel-client.
//!
//! The infrastructure layer handles all I/O: the WebSocket connection to the
//! relay and the HTTP calls to the local service.
//!
//! # Responsibilities
//!
//! - Building the relay WebSocket URL and handshake headers
//! - Running the Engine.IO / Socket.IO connection and reconnect loop
//! - Writing outbound events to the relay in queue order
//! - Executing local HTTP calls with a shared, capped connection pool
//! - Providing an in-memory item registry for standalone runs
//!
//! # What does NOT belong here?
//!
//! - Decisions about which events to emit (that is the application layer)
//! - Wire formats (that is `tunnel-core`)
//! - Configuration parsing (that is done in `main.rs`)

pub mod item_registry;
pub mod local_http;
pub mod relay_conn;
pub mod transport;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use item_registry::InMemoryItemRegistry;
pub use local_http::ReqwestLocalClient;
pub use transport::{connect, run_transport};
