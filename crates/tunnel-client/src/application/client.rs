//! `TunnelClient`: the assembled application layer.

use std::sync::Arc;

use crate::application::command_gate::CommandGate;
use crate::application::notifier::OutboundNotifier;
use crate::application::ports::{AutomationBus, ItemLookup, LocalHttpClient};
use crate::application::router::InboundRouter;
use crate::application::session::Session;
use crate::domain::TunnelConfig;

/// One tunnel client: a session plus the components that act on it.
///
/// Cheap to clone; every clone shares the same session.  The transport
/// (`infrastructure::transport::connect`) drives it.
#[derive(Debug, Clone)]
pub struct TunnelClient {
    session: Arc<Session>,
    router: Arc<InboundRouter>,
    notifier: OutboundNotifier,
}

impl TunnelClient {
    pub fn new(
        config: TunnelConfig,
        local_http: Arc<dyn LocalHttpClient>,
        items: Arc<dyn ItemLookup>,
        bus: Arc<dyn AutomationBus>,
    ) -> Self {
        let session = Arc::new(Session::new(Arc::new(config), local_http));
        let gate = CommandGate::new(Arc::clone(&session), items, bus);
        let router = Arc::new(InboundRouter::new(Arc::clone(&session), gate));
        let notifier = OutboundNotifier::new(Arc::clone(&session));
        Self {
            session,
            router,
            notifier,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn router(&self) -> &Arc<InboundRouter> {
        &self.router
    }

    /// Outbound notifier; also the host's [`crate::application::ports::UpdateSink`].
    pub fn notifier(&self) -> &OutboundNotifier {
        &self.notifier
    }

    pub fn config(&self) -> &Arc<TunnelConfig> {
        self.session.config()
    }
}
