//! Command gate: decides whether a relay `command` reaches the host.
//!
//! Checks run in this order, and the first failure drops the command:
//!
//! 1. the item is in the exposed set,
//! 2. the host knows the item,
//! 3. the command parses: `"toggle"` resolves against the current state,
//!    anything else against the item kind's vocabulary.
//!
//! An accepted command is posted to the automation bus exactly once.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use tunnel_core::domain::item::TOGGLE;
use tunnel_core::protocol::CommandEvent;
use tunnel_core::{Command, ItemKind};

use crate::application::ports::{AutomationBus, ItemLookup};
use crate::application::session::Session;

/// Reasons a relay command is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("item {0} is not exposed to the relay")]
    NotExposed(String),

    #[error("unknown item {0}")]
    UnknownItem(String),

    #[error("item {item} of kind {kind:?} cannot be toggled")]
    NotToggleable { item: String, kind: ItemKind },

    #[error("item {item} does not accept command {command:?}")]
    UnparseableCommand { item: String, command: String },
}

/// Filters and forwards relay commands.
pub struct CommandGate {
    session: Arc<Session>,
    items: Arc<dyn ItemLookup>,
    bus: Arc<dyn AutomationBus>,
}

impl std::fmt::Debug for CommandGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGate").finish_non_exhaustive()
    }
}

impl CommandGate {
    pub fn new(session: Arc<Session>, items: Arc<dyn ItemLookup>, bus: Arc<dyn AutomationBus>) -> Self {
        Self {
            session,
            items,
            bus,
        }
    }

    /// Resolves `event` to a command without posting it.
    ///
    /// # Errors
    ///
    /// Returns the first [`GateError`] in the order documented on the module.
    pub fn resolve(&self, event: &CommandEvent) -> Result<Command, GateError> {
        if !self.session.exposed_items().contains(&event.item) {
            return Err(GateError::NotExposed(event.item.clone()));
        }
        let item = self
            .items
            .get(&event.item)
            .ok_or_else(|| GateError::UnknownItem(event.item.clone()))?;

        if event.command == TOGGLE {
            return item.toggle_command().ok_or(GateError::NotToggleable {
                item: item.name.clone(),
                kind: item.kind,
            });
        }

        item.parse_command(&event.command)
            .ok_or_else(|| GateError::UnparseableCommand {
                item: item.name.clone(),
                command: event.command.clone(),
            })
    }

    /// Resolves `event` and posts the command to the bus.
    ///
    /// # Errors
    ///
    /// Returns the [`GateError`] that dropped the command; nothing was posted.
    pub fn handle(&self, event: &CommandEvent) -> Result<Command, GateError> {
        let command = self.resolve(event).map_err(|e| {
            warn!(item = %event.item, command = %event.command, "relay command dropped: {e}");
            e
        })?;
        debug!(item = %event.item, %command, "posting relay command");
        self.bus.post_command(&event.item, command.clone());
        Ok(command)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockAutomationBus, MockItemLookup};
    use crate::application::session::tests::IdleClient;
    use crate::domain::TunnelConfig;
    use mockall::predicate::eq;
    use tunnel_core::{ItemSnapshot, ItemState};

    fn session(exposed: &[&str]) -> Arc<Session> {
        let config = TunnelConfig {
            exposed_items: exposed.iter().copied().collect(),
            ..TunnelConfig::default()
        };
        Arc::new(Session::new(Arc::new(config), Arc::new(IdleClient::default())))
    }

    fn lookup_returning(name: &'static str, kind: ItemKind, state: &'static str) -> MockItemLookup {
        let mut items = MockItemLookup::new();
        items.expect_get().returning(move |requested| {
            (requested == name).then(|| ItemSnapshot {
                name: name.to_string(),
                kind,
                state: ItemState(state.to_string()),
            })
        });
        items
    }

    fn event(item: &str, command: &str) -> CommandEvent {
        CommandEvent {
            item: item.to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn test_toggle_switch_that_is_on_posts_off() {
        // Arrange
        let items = lookup_returning("Kitchen_Light", ItemKind::Switch, "ON");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command()
            .with(eq("Kitchen_Light"), eq(Command::Off))
            .times(1)
            .return_const(());
        let gate = CommandGate::new(session(&["Kitchen_Light"]), Arc::new(items), Arc::new(bus));

        // Act
        let result = gate.handle(&event("Kitchen_Light", "toggle"));

        // Assert
        assert_eq!(result, Ok(Command::Off));
    }

    #[test]
    fn test_toggle_dimmer_at_zero_posts_on() {
        let items = lookup_returning("Hall_Dimmer", ItemKind::Dimmer, "0");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command()
            .with(eq("Hall_Dimmer"), eq(Command::On))
            .times(1)
            .return_const(());
        let gate = CommandGate::new(session(&["Hall_Dimmer"]), Arc::new(items), Arc::new(bus));

        assert_eq!(gate.handle(&event("Hall_Dimmer", "toggle")), Ok(Command::On));
    }

    #[test]
    fn test_toggle_rollershutter_up_posts_down() {
        let items = lookup_returning("Blind", ItemKind::Rollershutter, "0");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command()
            .with(eq("Blind"), eq(Command::Down))
            .times(1)
            .return_const(());
        let gate = CommandGate::new(session(&["Blind"]), Arc::new(items), Arc::new(bus));

        assert_eq!(gate.handle(&event("Blind", "toggle")), Ok(Command::Down));
    }

    #[test]
    fn test_toggle_rollershutter_half_down_posts_up() {
        let items = lookup_returning("Blind", ItemKind::Rollershutter, "40");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command()
            .with(eq("Blind"), eq(Command::Up))
            .times(1)
            .return_const(());
        let gate = CommandGate::new(session(&["Blind"]), Arc::new(items), Arc::new(bus));

        assert_eq!(gate.handle(&event("Blind", "toggle")), Ok(Command::Up));
    }

    #[test]
    fn test_unexposed_item_never_reaches_bus() {
        // Arrange: the lookup must not even be consulted.
        let mut items = MockItemLookup::new();
        items.expect_get().never();
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command().never();
        let gate = CommandGate::new(session(&["Other"]), Arc::new(items), Arc::new(bus));

        // Act
        let result = gate.handle(&event("Kitchen_Light", "ON"));

        // Assert
        assert_eq!(result, Err(GateError::NotExposed("Kitchen_Light".to_string())));
    }

    #[test]
    fn test_unknown_item_is_dropped() {
        let mut items = MockItemLookup::new();
        items.expect_get().returning(|_| None);
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command().never();
        let gate = CommandGate::new(session(&["Ghost"]), Arc::new(items), Arc::new(bus));

        assert_eq!(
            gate.handle(&event("Ghost", "ON")),
            Err(GateError::UnknownItem("Ghost".to_string()))
        );
    }

    #[test]
    fn test_toggle_contact_is_refused() {
        let items = lookup_returning("Door", ItemKind::Contact, "CLOSED");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command().never();
        let gate = CommandGate::new(session(&["Door"]), Arc::new(items), Arc::new(bus));

        assert_eq!(
            gate.handle(&event("Door", "toggle")),
            Err(GateError::NotToggleable {
                item: "Door".to_string(),
                kind: ItemKind::Contact,
            })
        );
    }

    #[test]
    fn test_unparseable_command_is_dropped() {
        let items = lookup_returning("Kitchen_Light", ItemKind::Switch, "OFF");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command().never();
        let gate = CommandGate::new(session(&["Kitchen_Light"]), Arc::new(items), Arc::new(bus));

        assert!(matches!(
            gate.handle(&event("Kitchen_Light", "UP")),
            Err(GateError::UnparseableCommand { .. })
        ));
    }

    #[test]
    fn test_toggle_keyword_is_case_sensitive() {
        let items = lookup_returning("Kitchen_Light", ItemKind::Switch, "OFF");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command().never();
        let gate = CommandGate::new(session(&["Kitchen_Light"]), Arc::new(items), Arc::new(bus));

        assert!(gate.handle(&event("Kitchen_Light", "TOGGLE")).is_err());
    }

    #[test]
    fn test_plain_command_is_parsed_against_kind() {
        let items = lookup_returning("Hall_Dimmer", ItemKind::Dimmer, "0");
        let mut bus = MockAutomationBus::new();
        bus.expect_post_command()
            .with(eq("Hall_Dimmer"), eq(Command::Percent(55.0)))
            .times(1)
            .return_const(());
        let gate = CommandGate::new(session(&["Hall_Dimmer"]), Arc::new(items), Arc::new(bus));

        assert_eq!(gate.handle(&event("Hall_Dimmer", "55")), Ok(Command::Percent(55.0)));
    }
}
