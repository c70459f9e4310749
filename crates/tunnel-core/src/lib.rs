//! # tunnel-core
//!
//! Shared library for the relay tunnel client containing the relay event
//! types, the Socket.IO packet codec, and the request/item domain types.
//!
//! It has zero dependencies on async runtimes, sockets, or HTTP clients.
//!
//! # Architecture overview (for beginners)
//!
//! A service on a private network cannot accept connections from the public
//! internet.  Instead it dials *out* to a public relay and keeps that single
//! connection open.  The relay pushes public HTTP requests down the connection
//! as events; the client replays them against the local service and streams
//! the answer back as more events.
//!
//! This crate (`tunnel-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What travels over the relay connection.  Events are
//!   typed enums ([`InboundEvent`], [`OutboundEvent`]) and are framed into
//!   Socket.IO text/binary frames by the packet codec.
//!
//! - **`domain`** – Pure business types: the validated [`ProxiedRequest`],
//!   the automation item model (kinds, states, commands), the exposed-item
//!   allow-list and notification messages.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `tunnel_core::ProxiedRequest` instead of the full module path.
pub use domain::exposed::ExposedItemSet;
pub use domain::item::{Command, ItemKind, ItemSnapshot, ItemState};
pub use domain::notification::NotificationMessage;
pub use domain::request::{HttpMethod, OrderedMap, ProxiedRequest, RequestId};
pub use protocol::error::ProtocolError;
pub use protocol::events::{InboundEvent, OutboundEvent};
pub use protocol::packet::{Frame, Packet};
