//! Best-effort outbound notifications and item-state sync.
//!
//! Every method checks the session's `connected` flag first.  While
//! disconnected the message is dropped with a debug log: there is no queue
//! and no retry.  A full outbound queue drops the message the same way.

use std::sync::Arc;

use tracing::debug;
use tunnel_core::{ItemState, NotificationMessage, OutboundEvent};

use crate::application::ports::UpdateSink;
use crate::application::session::Session;

/// Sends notifications and item updates to the relay.
#[derive(Debug, Clone)]
pub struct OutboundNotifier {
    session: Arc<Session>,
}

impl OutboundNotifier {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn send(&self, event: OutboundEvent) -> bool {
        let name = event.name();
        if !self.session.is_connected() {
            debug!(event = name, "not connected to the relay; dropped");
            return false;
        }
        let Some(emitter) = self.session.emitter() else {
            debug!(event = name, "no outbound channel; dropped");
            return false;
        };
        let sent = emitter.try_emit(event);
        if !sent {
            debug!(event = name, "outbound queue unavailable; dropped");
        }
        sent
    }

    /// Notification addressed to one user.
    pub fn send_notification(&self, user_id: &str, message: &str, icon: &str, severity: &str) -> bool {
        self.send(OutboundEvent::Notification(
            NotificationMessage::new(message, icon, severity).for_user(user_id),
        ))
    }

    /// Notification recorded in the relay's log only.
    pub fn send_log_notification(&self, message: &str, icon: &str, severity: &str) -> bool {
        self.send(OutboundEvent::LogNotification(NotificationMessage::new(
            message, icon, severity,
        )))
    }

    /// Notification sent to every user of the instance.
    pub fn send_broadcast_notification(&self, message: &str, icon: &str, severity: &str) -> bool {
        self.send(OutboundEvent::BroadcastNotification(NotificationMessage::new(
            message, icon, severity,
        )))
    }

    /// State change of an item.  Items outside the exposed set are not synced.
    pub fn send_item_update(&self, item: &str, state: &ItemState) -> bool {
        if !self.session.exposed_items().contains(item) {
            debug!(item, "item is not exposed; update not synced");
            return false;
        }
        self.send(OutboundEvent::ItemUpdate {
            item_name: item.to_string(),
            item_status: state.as_str().to_string(),
        })
    }
}

impl UpdateSink for OutboundNotifier {
    fn send_item_update(&self, item: &str, state: &ItemState) {
        OutboundNotifier::send_item_update(self, item, state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
