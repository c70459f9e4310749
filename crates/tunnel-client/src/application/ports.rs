//! Ports: the traits the application layer uses to reach the outside world.
//!
//! The session, dispatcher and command gate never touch a socket or an HTTP
//! client directly.  They call these traits; `infrastructure` provides the
//! real implementations and tests provide fakes.
//!
//! | Port               | Implemented by                                   |
//! |--------------------|--------------------------------------------------|
//! | [`LocalHttpClient`] | `infrastructure::local_http::ReqwestLocalClient` |
//! | [`ItemLookup`]     | `infrastructure::item_registry::InMemoryItemRegistry` |
//! | [`AutomationBus`]  | `infrastructure::item_registry::InMemoryItemRegistry` |
//! | [`UpdateSink`]     | `application::notifier::OutboundNotifier`        |

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tunnel_core::{Command, HttpMethod, ItemSnapshot, ItemState, RequestId};

// ── Local HTTP executor ───────────────────────────────────────────────────────

/// Errors raised by a [`LocalHttpClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalCallError {
    /// The call could not be built: bad URL, invalid header name or value.
    /// Nothing was sent.
    #[error("cannot build local call: {0}")]
    Construction(String),

    /// Connecting, sending or reading the body failed.
    #[error("local call failed: {0}")]
    Network(String),

    /// The executor is stopped (the relay connection is down).
    #[error("local HTTP pool is stopped")]
    PoolStopped,
}

/// One HTTP call against the local service, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCall {
    /// Relay id the call belongs to; used for logging only.
    pub id: RequestId,
    pub method: HttpMethod,
    /// Absolute target URL.
    pub url: String,
    /// Headers in the order they are applied.
    pub headers: Vec<(String, String)>,
    /// Body bytes; `None` for GET.
    pub body: Option<Vec<u8>>,
}

/// Stream of response body chunks in arrival order.
pub type BodyStream = BoxStream<'static, Result<Bytes, LocalCallError>>;

/// Status line and headers of a local response, plus its streaming body.
pub struct LocalResponse {
    pub status: u16,
    /// Response headers in wire order; names may repeat.
    pub headers: Vec<(String, String)>,
    pub body: BodyStream,
}

impl std::fmt::Debug for LocalResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP client for the local service.
///
/// `send` resolves once the status line and headers have arrived; the body is
/// read afterwards through [`LocalResponse::body`].  Dropping the future or
/// the body stream aborts the call.
#[async_trait]
pub trait LocalHttpClient: Send + Sync {
    /// Starts (or resumes) the connection pool.  Idempotent.
    fn start(&self);

    /// Stops the pool.  Calls made afterwards fail with
    /// [`LocalCallError::PoolStopped`].  Idempotent.
    fn stop(&self);

    /// Sends one call.
    async fn send(&self, call: LocalCall) -> Result<LocalResponse, LocalCallError>;
}

// ── Host automation system ────────────────────────────────────────────────────

/// Read access to the host's items.
#[cfg_attr(test, mockall::automock)]
pub trait ItemLookup: Send + Sync {
    /// Returns the item named `name`, or `None` if the host has no such item.
    fn get(&self, name: &str) -> Option<ItemSnapshot>;
}

/// Delivers commands to the host's items.
#[cfg_attr(test, mockall::automock)]
pub trait AutomationBus: Send + Sync {
    fn post_command(&self, item: &str, command: Command);
}

/// Receives item state changes from the host.
pub trait UpdateSink: Send + Sync {
    fn send_item_update(&self, item: &str, state: &ItemState);
}
