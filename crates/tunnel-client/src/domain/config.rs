//! Tunnel configuration types.
//!
//! [`TunnelConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments (preferred for production) or from
//! sensible defaults (useful for local development and tests).
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the tunnel easy to embed in tests
//! and lets several clients run side by side in one process.  `main.rs` is
//! responsible for populating the struct from CLI args or environment
//! variables.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tunnel_core::ExposedItemSet;
use url::Url;
use uuid::Uuid;

/// Errors found while validating a [`TunnelConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("relay URL must use http, https, ws or wss: {0}")]
    RelayScheme(String),
    #[error("local base URL must use http or https: {0}")]
    LocalScheme(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Identity presented to the relay on every connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Instance id registered with the relay.
    pub instance_id: Uuid,
    /// Shared secret registered with the relay.
    pub secret: String,
}

impl fmt::Debug for Credentials {
    /// Never prints the secret.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("instance_id", &self.instance_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// All runtime configuration for the tunnel client.
///
/// Build this struct once at startup (via CLI args or defaults); the client
/// wraps it in an `Arc` so every request task can read it cheaply.
///
/// # Example
///
/// ```rust
/// use tunnel_client::domain::TunnelConfig;
///
/// let cfg = TunnelConfig::default();
/// assert_eq!(cfg.max_connections_per_destination, 200);
/// assert!(cfg.remote_access);
/// ```
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Base address of the relay, e.g. `https://myopenhab.org/`.
    pub relay_url: Url,

    /// Base address of the private service requests are replayed against.
    pub local_base_url: Url,

    /// Instance id and secret sent in the handshake headers.
    pub credentials: Credentials,

    /// Whether the relay may proxy HTTP requests to the local service.
    ///
    /// When `false`, inbound `request` and `cancel` events are ignored
    /// outright; notifications and commands still work.
    pub remote_access: bool,

    /// Version of the host automation system (`openhabversion` header).
    pub host_version: String,

    /// Version of this client (`clientversion` header).
    pub client_version: String,

    /// Ceiling on one local call, from dispatch to the last body byte.
    pub local_request_timeout: Duration,

    /// Maximum concurrent connections to the local service.  Calls beyond
    /// this limit wait for a free connection instead of failing.
    pub max_connections_per_destination: usize,

    /// Pause between a lost relay connection and the next attempt.
    pub reconnect_delay: Duration,

    /// Capacity of the ordered outbound event queue of one connection.
    pub outbound_queue_capacity: usize,

    /// Items the relay may command and observe.
    pub exposed_items: ExposedItemSet,
}

impl TunnelConfig {
    /// Checks the settings that would otherwise fail late at runtime.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.relay_url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::RelayScheme(self.relay_url.to_string()));
        }
        if !matches!(self.local_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::LocalScheme(self.local_base_url.to_string()));
        }
        if self.local_request_timeout.is_zero() {
            return Err(ConfigError::Zero("local request timeout"));
        }
        if self.max_connections_per_destination == 0 {
            return Err(ConfigError::Zero("max connections per destination"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Zero("outbound queue capacity"));
        }
        Ok(())
    }

    /// Public scheme implied by the relay address: `https` for TLS relays,
    /// `http` otherwise.
    pub fn relay_public_scheme(&self) -> &'static str {
        match self.relay_url.scheme() {
            "https" | "wss" => "https",
            _ => "http",
        }
    }
}

impl Default for TunnelConfig {
    /// Returns a `TunnelConfig` suitable for local development without any
    /// external configuration.
    ///
    /// | Field                           | Default                    |
    /// |---------------------------------|----------------------------|
    /// | relay_url                       | `https://myopenhab.org/`   |
    /// | local_base_url                  | `http://127.0.0.1:8080/`   |
    /// | remote_access                   | `true`                     |
    /// | local_request_timeout           | 30 seconds                 |
    /// | max_connections_per_destination | 200                        |
    /// | reconnect_delay                 | 5 seconds                  |
    /// | outbound_queue_capacity         | 1024                       |
    fn default() -> Self {
        Self {
            // These are compile-time-known valid URL strings.
            relay_url: Url::parse("https://myopenhab.org/").unwrap(),
            local_base_url: Url::parse("http://127.0.0.1:8080/").unwrap(),
            credentials: Credentials {
                instance_id: Uuid::nil(),
                secret: String::new(),
            },
            remote_access: true,
            host_version: "unknown".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            local_request_timeout: Duration::from_secs(30),
            max_connections_per_destination: 200,
            reconnect_delay: Duration::from_secs(5),
            outbound_queue_capacity: 1024,
            exposed_items: ExposedItemSet::empty(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
