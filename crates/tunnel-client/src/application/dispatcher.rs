//! Request dispatcher: turns a validated `request` event into a local call.
//!
//! Dispatching never blocks the event loop.  It resolves the target URL and
//! headers, registers the abort handle, then spawns one task that runs the
//! call and emits its events (see [`crate::application::streamer`]).

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tunnel_core::domain::request::FORWARDED_PROTO_HEADER;
use tunnel_core::{ProxiedRequest, RequestId};

use crate::application::ports::LocalCall;
use crate::application::registry::RegistryError;
use crate::application::session::Session;
use crate::application::streamer::{run_call, CallState, ResponseStreamer};

/// Reasons a `request` event is refused.  Nothing is emitted for a refused
/// request.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("not connected to the relay")]
    NotConnected,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Starts and cancels local calls on behalf of the relay.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    session: Arc<Session>,
}

impl RequestDispatcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Builds the local call for `request`, without sending it.
    ///
    /// Relay headers are copied in wire order, minus the excluded ones and
    /// minus any relay-supplied `X-Forwarded-Proto`; the dispatcher's own
    /// `X-Forwarded-Proto` goes last.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidUrl`] if the joined target URL does
    /// not parse.
    pub fn build_call(&self, request: &ProxiedRequest) -> Result<LocalCall, DispatchError> {
        let url = request.target_url(self.session.config().local_base_url.as_str());
        url::Url::parse(&url).map_err(|e| DispatchError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let scheme = self.session.public_scheme();
        let mut headers: Vec<(String, String)> = request
            .forwarded_headers()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(FORWARDED_PROTO_HEADER))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        headers.push((
            FORWARDED_PROTO_HEADER.to_string(),
            request.forwarded_proto(&scheme).to_string(),
        ));

        Ok(LocalCall {
            id: request.id,
            method: request.method,
            url,
            headers,
            body: request.call_body().map(<[u8]>::to_vec),
        })
    }

    /// Registers `request` and spawns its local call.
    ///
    /// The abort handle is in the registry before the call starts, so a
    /// `cancel` processed after this returns always reaches the call.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotConnected`] if there is no live connection.
    /// - [`DispatchError::InvalidUrl`] if the target URL does not parse.
    /// - [`DispatchError::Registry`] if the id is already in flight.
    pub fn dispatch(&self, request: ProxiedRequest) -> Result<JoinHandle<CallState>, DispatchError> {
        let emitter = self.session.emitter().ok_or(DispatchError::NotConnected)?;
        let call = self.build_call(&request)?;

        let registry = Arc::clone(self.session.registry());
        let signal = registry.register(request.id)?;
        let streamer = ResponseStreamer::new(request.id, emitter, registry);

        debug!(id = %request.id, method = %request.method, url = %call.url, "dispatching local call");
        let handle = tokio::spawn(run_call(
            self.session.local_http(),
            call,
            streamer,
            signal,
            self.session.config().local_request_timeout,
        ));
        Ok(handle)
    }

    /// Aborts the call registered under `id`.  Unknown ids are ignored.
    pub fn cancel(&self, id: RequestId) -> bool {
        let cancelled = self.session.registry().cancel(id);
        if cancelled {
            info!(%id, "request cancelled by relay");
        } else {
            debug!(%id, "cancel for unknown request ignored");
        }
        cancelled
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::emitter::RelayEmitter;
    use crate::application::session::tests::IdleClient;
    use crate::domain::TunnelConfig;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tunnel_core::{HttpMethod, OrderedMap, OutboundEvent};

    fn request(id: i64, method: HttpMethod, headers: OrderedMap) -> ProxiedRequest {
        ProxiedRequest {
            id: RequestId(id),
            method,
            path: "/rest/items/Kitchen_Light".to_string(),
            query: OrderedMap::new(),
            headers,
            body: b"ON".to_vec(),
            protocol: None,
        }
    }

    struct Connected {
        dispatcher: RequestDispatcher,
        session: Arc<Session>,
        client: Arc<IdleClient>,
        _rx: mpsc::Receiver<OutboundEvent>,
    }

    fn connected() -> Connected {
        let client = Arc::new(IdleClient::default());
        let session = Arc::new(Session::new(Arc::new(TunnelConfig::default()), client.clone()));
        let (emitter, rx) = RelayEmitter::channel(16);
        session.on_connected(emitter, None);
        Connected {
            dispatcher: RequestDispatcher::new(Arc::clone(&session)),
            session,
            client,
            _rx: rx,
        }
    }

    #[test]
    fn test_build_call_forwards_headers_and_sets_proto_last() {
        // Arrange
        let Connected { dispatcher, .. } = connected();
        let headers: OrderedMap = [
            ("Accept", "text/plain"),
            ("Content-Length", "2"),
            ("x-forwarded-proto", "ftp"),
            ("Authorization", "Bearer abc"),
        ]
        .into_iter()
        .collect();

        // Act
        let call = dispatcher
            .build_call(&request(1, HttpMethod::Post, headers))
            .unwrap();

        // Assert
        assert_eq!(call.url, "http://127.0.0.1:8080/rest/items/Kitchen_Light");
        assert_eq!(
            call.headers,
            vec![
                ("Accept".to_string(), "text/plain".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("X-Forwarded-Proto".to_string(), "https".to_string()),
            ]
        );
        assert_eq!(call.body.as_deref(), Some(&b"ON"[..]));
    }

    #[test]
    fn test_build_call_prefers_request_protocol() {
        let Connected { dispatcher, .. } = connected();
        let mut req = request(2, HttpMethod::Get, OrderedMap::new());
        req.protocol = Some("http".to_string());

        let call = dispatcher.build_call(&req).unwrap();

        assert_eq!(call.headers.last().unwrap().1, "http");
        assert_eq!(call.body, None);
    }

    #[tokio::test]
    async fn test_dispatch_registers_before_call_runs() {
        let Connected {
            dispatcher,
            session,
            client,
            _rx,
        } = connected();

        let handle = dispatcher
            .dispatch(request(3, HttpMethod::Get, OrderedMap::new()))
            .unwrap();

        assert!(session.registry().contains(RequestId(3)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.sends.load(Ordering::SeqCst), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_is_rejected() {
        let Connected {
            dispatcher,
            session,
            _rx,
            ..
        } = connected();
        let first = dispatcher
            .dispatch(request(4, HttpMethod::Get, OrderedMap::new()))
            .unwrap();

        let second = dispatcher.dispatch(request(4, HttpMethod::Get, OrderedMap::new()));

        assert_eq!(
            second.unwrap_err(),
            DispatchError::Registry(RegistryError::DuplicateId(RequestId(4)))
        );
        assert_eq!(session.registry().len(), 1);
        first.abort();
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_call() {
        let Connected {
            dispatcher,
            session,
            _rx,
            ..
        } = connected();
        let handle = dispatcher
            .dispatch(request(5, HttpMethod::Get, OrderedMap::new()))
            .unwrap();

        assert!(dispatcher.cancel(RequestId(5)));

        assert_eq!(handle.await.unwrap(), CallState::Aborted);
        assert!(session.registry().is_empty());
    }

    #[test]
    fn test_cancel_unknown_id_returns_false() {
        let Connected { dispatcher, .. } = connected();
        assert!(!dispatcher.cancel(RequestId(7)));
    }

    #[test]
    fn test_dispatch_while_disconnected_is_refused() {
        let client = Arc::new(IdleClient::default());
        let session = Arc::new(Session::new(Arc::new(TunnelConfig::default()), client));
        let dispatcher = RequestDispatcher::new(Arc::clone(&session));

        let result = dispatcher.dispatch(request(6, HttpMethod::Get, OrderedMap::new()));

        assert_eq!(result.unwrap_err(), DispatchError::NotConnected);
        assert!(session.registry().is_empty());
    }
}
