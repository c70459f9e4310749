//! tunnel-client library crate.
//!
//! This crate keeps one outbound WebSocket connection to a public relay and
//! replays the HTTP requests the relay forwards against a service that is
//! only reachable on the private network.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Relay (Socket.IO events over WebSocket)
//!         ↕
//! [tunnel-client]
//!   ├── domain/           TunnelConfig, Credentials
//!   ├── application/      Session, dispatcher, registry, streamer,
//!   │                     notifier, command gate, ports (traits)
//!   └── infrastructure/
//!         ├── transport/  Relay connection loop (tokio-tungstenite)
//!         ├── relay_conn/ Handshake request and WebSocket URL
//!         ├── local_http/ Local HTTP executor (reqwest)
//!         └── item_registry/ In-memory host items
//!         ↕
//! Local HTTP service
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `tunnel-core`; it reaches the
//!   outside world only through the traits in `application::ports`.
//! - `infrastructure` implements those traits with `tokio`, `tungstenite`
//!   and `reqwest`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the tunnel protocol state machine.
pub mod application;

/// Infrastructure layer: relay WebSocket, local HTTP client, in-memory host.
pub mod infrastructure;
