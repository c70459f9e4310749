//! Domain entities for the relay tunnel.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core business rules of the application.
//! - Has **no** imports from sockets, HTTP clients, or async runtimes.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Here the rules are: how a relay request becomes a local URL and header
//! set, which commands an item accepts, what "toggle" means for each item
//! kind, and which items are exposed to the relay at all.

/// Allow-list of exposed items.
pub mod exposed;

/// Item kinds, states, and command vocabularies.
pub mod item;

/// Outbound notification message.
pub mod notification;

/// The proxied HTTP request.
pub mod request;
