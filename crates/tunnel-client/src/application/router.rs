//! Inbound router: the single entry point for relay events.
//!
//! The transport hands every decoded Socket.IO event to
//! [`InboundRouter::route_event`].  The router decodes it into an
//! [`InboundEvent`] and matches exhaustively; no error leaves this module.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use tunnel_core::InboundEvent;

use crate::application::command_gate::CommandGate;
use crate::application::dispatcher::RequestDispatcher;
use crate::application::session::Session;

/// What the router did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A local call was started.
    Dispatched,
    /// An in-flight call was aborted.
    Cancelled,
    /// A command was posted to the automation bus.
    CommandPosted,
    /// The event was dropped (malformed, refused or not applicable).
    Ignored,
}

/// Routes inbound relay events to the dispatcher and the command gate.
#[derive(Debug)]
pub struct InboundRouter {
    /// `None` when remote access is disabled: `request` and `cancel` events
    /// have nowhere to go.
    dispatcher: Option<RequestDispatcher>,
    gate: CommandGate,
}

impl InboundRouter {
    pub fn new(session: Arc<Session>, gate: CommandGate) -> Self {
        let dispatcher = session
            .remote_access_enabled()
            .then(|| RequestDispatcher::new(Arc::clone(&session)));
        Self { dispatcher, gate }
    }

    pub fn dispatcher(&self) -> Option<&RequestDispatcher> {
        self.dispatcher.as_ref()
    }

    /// Decodes and routes one wire event.
    pub fn route_event(&self, name: &str, payload: Value) -> RouteOutcome {
        if self.dispatcher.is_none() && matches!(name, "request" | "cancel") {
            debug!(event = name, "remote access disabled; event ignored");
            return RouteOutcome::Ignored;
        }
        match InboundEvent::decode(name, payload) {
            Ok(event) => self.route(event),
            Err(e) => {
                warn!(event = name, "dropping malformed relay event: {e}");
                RouteOutcome::Ignored
            }
        }
    }

    /// Routes one validated event.
    pub fn route(&self, event: InboundEvent) -> RouteOutcome {
        match (event, &self.dispatcher) {
            (InboundEvent::Request(_) | InboundEvent::Cancel { .. }, None) => {
                debug!("remote access disabled; event ignored");
                RouteOutcome::Ignored
            }
            (InboundEvent::Request(request), Some(dispatcher)) => {
                let id = request.id;
                match dispatcher.dispatch(request) {
                    Ok(_) => RouteOutcome::Dispatched,
                    Err(e) => {
                        warn!(%id, "request refused: {e}");
                        RouteOutcome::Ignored
                    }
                }
            }
            (InboundEvent::Cancel { id }, Some(dispatcher)) => {
                if dispatcher.cancel(id) {
                    RouteOutcome::Cancelled
                } else {
                    RouteOutcome::Ignored
                }
            }
            (InboundEvent::Command(command), _) => match self.gate.handle(&command) {
                Ok(_) => RouteOutcome::CommandPosted,
                Err(_) => RouteOutcome::Ignored,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
