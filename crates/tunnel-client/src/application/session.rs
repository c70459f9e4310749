//! The tunnel session: shared state of one client across connections.
//!
//! A [`Session`] lives for the whole run of the service.  The transport calls
//! [`Session::on_connected`] and [`Session::on_disconnected`] on every edge;
//! everything else reads the session.
//!
//! # What a disconnect does
//!
//! 1. `connected` goes false, so notifications are dropped from now on.
//! 2. The outbound emitter is detached.  Calls still running hold a clone of
//!    the old emitter, whose queue is closed, so nothing they emit can reach a
//!    later connection.
//! 3. Every in-flight call is aborted and the registry emptied.
//! 4. The local HTTP pool is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::info;
use tunnel_core::ExposedItemSet;

use crate::application::emitter::RelayEmitter;
use crate::application::ports::LocalHttpClient;
use crate::application::registry::CancellationRegistry;
use crate::domain::TunnelConfig;

/// Shared state of the tunnel client.
pub struct Session {
    config: Arc<TunnelConfig>,
    connected: AtomicBool,
    scheme: RwLock<String>,
    outbound: RwLock<Option<RelayEmitter>>,
    registry: Arc<CancellationRegistry>,
    exposed: RwLock<Arc<ExposedItemSet>>,
    local_http: Arc<dyn LocalHttpClient>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("instance_id", &self.config.credentials.instance_id)
            .field("connected", &self.is_connected())
            .field("in_flight", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(config: Arc<TunnelConfig>, local_http: Arc<dyn LocalHttpClient>) -> Self {
        let scheme = config.relay_public_scheme().to_string();
        let exposed = Arc::new(config.exposed_items.clone());
        Self {
            config,
            connected: AtomicBool::new(false),
            scheme: RwLock::new(scheme),
            outbound: RwLock::new(None),
            registry: Arc::new(CancellationRegistry::new()),
            exposed: RwLock::new(exposed),
            local_http,
        }
    }

    // ── Connection edges ──────────────────────────────────────────────────────

    /// Called once the relay has accepted the connection.
    ///
    /// `scheme_override` is the public scheme announced by the relay, if any;
    /// otherwise the scheme implied by the relay URL is used.
    pub fn on_connected(&self, emitter: RelayEmitter, scheme_override: Option<String>) {
        let scheme = scheme_override
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.relay_public_scheme().to_string());

        *self.scheme.write().unwrap_or_else(|e| e.into_inner()) = scheme.clone();
        *self.outbound.write().unwrap_or_else(|e| e.into_inner()) = Some(emitter);
        self.local_http.start();
        self.connected.store(true, Ordering::SeqCst);

        info!(
            instance = %self.config.credentials.instance_id,
            %scheme,
            remote_access = self.config.remote_access,
            "connected to relay"
        );
    }

    /// Called when the relay connection is lost or closed.  Idempotent.
    pub fn on_disconnected(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.outbound.write().unwrap_or_else(|e| e.into_inner()).take();
        let aborted = self.registry.clear();
        self.local_http.stop();

        if was_connected {
            info!(aborted, "disconnected from relay");
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Public scheme recorded at the last connect.
    pub fn public_scheme(&self) -> String {
        self.scheme.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Emitter of the live connection, or `None` while disconnected.
    pub fn emitter(&self) -> Option<RelayEmitter> {
        self.outbound.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    pub fn local_http(&self) -> Arc<dyn LocalHttpClient> {
        Arc::clone(&self.local_http)
    }

    pub fn config(&self) -> &Arc<TunnelConfig> {
        &self.config
    }

    pub fn remote_access_enabled(&self) -> bool {
        self.config.remote_access
    }

    /// The current exposed item set.
    pub fn exposed_items(&self) -> Arc<ExposedItemSet> {
        Arc::clone(&self.exposed.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replaces the exposed item set as a whole.
    pub fn reload_exposed_items(&self, items: ExposedItemSet) {
        info!(count = items.len(), "exposed items reloaded");
        *self.exposed.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(items);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::ports::{LocalCall, LocalCallError, LocalResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tunnel_core::RequestId;
    use url::Url;

    /// Local client that counts pool edges and never answers.
    #[derive(Default)]
    pub(crate) struct IdleClient {
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
        pub sends: AtomicUsize,
    }

    #[async_trait]
    impl LocalHttpClient for IdleClient {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn send(&self, _call: LocalCall) -> Result<LocalResponse, LocalCallError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            futures_util::future::pending().await
        }
    }

    fn session_with(config: TunnelConfig) -> (Session, Arc<IdleClient>) {
        let client = Arc::new(IdleClient::default());
        let session = Session::new(Arc::new(config), client.clone());
        (session, client)
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let (session, _) = session_with(TunnelConfig::default());
        assert!(!session.is_connected());
        assert!(session.emitter().is_none());
    }

    #[test]
    fn test_connect_records_relay_scheme_and_starts_pool() {
        // Arrange
        let (session, client) = session_with(TunnelConfig {
            relay_url: Url::parse("http://relay.local:3000/").unwrap(),
            ..TunnelConfig::default()
        });
        let (emitter, _rx) = RelayEmitter::channel(4);

        // Act
        session.on_connected(emitter, None);

        // Assert
        assert!(session.is_connected());
        assert_eq!(session.public_scheme(), "http");
        assert!(session.emitter().is_some());
        assert_eq!(client.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_ack_scheme_overrides_relay_scheme() {
        let (session, _) = session_with(TunnelConfig::default());
        let (emitter, _rx) = RelayEmitter::channel(4);

        session.on_connected(emitter, Some("http".to_string()));

        assert_eq!(session.public_scheme(), "http");
    }

    #[test]
    fn test_disconnect_clears_registry_and_stops_pool() {
        // Arrange
        let (session, client) = session_with(TunnelConfig::default());
        let (emitter, _rx) = RelayEmitter::channel(4);
        session.on_connected(emitter, None);
        let _a = session.registry().register(RequestId(1)).unwrap();
        let _b = session.registry().register(RequestId(2)).unwrap();

        // Act
        session.on_disconnected();

        // Assert
        assert!(!session.is_connected());
        assert!(session.emitter().is_none());
        assert!(session.registry().is_empty());
        assert_eq!(client.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (session, client) = session_with(TunnelConfig::default());
        session.on_disconnected();
        session.on_disconnected();
        assert!(!session.is_connected());
        assert_eq!(client.stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reload_replaces_exposed_set() {
        let (session, _) = session_with(TunnelConfig {
            exposed_items: ["Kitchen_Light"].into_iter().collect(),
            ..TunnelConfig::default()
        });
        let before = session.exposed_items();

        session.reload_exposed_items(["Garage_Door"].into_iter().collect());

        assert!(before.contains("Kitchen_Light"));
        assert!(!session.exposed_items().contains("Kitchen_Light"));
        assert!(session.exposed_items().contains("Garage_Door"));
    }
}
