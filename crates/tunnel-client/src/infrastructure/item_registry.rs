//! In-memory stand-in for the host automation system.
//!
//! Holds a fixed set of items seeded at startup, applies posted commands to
//! their state and reports state changes to an [`UpdateSink`] (normally the
//! tunnel's notifier).  It lets the binary run without a real automation
//! host and gives integration tests something to observe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};
use tunnel_core::{Command, ItemSnapshot, ItemState};

use crate::application::ports::{AutomationBus, ItemLookup, UpdateSink};

/// Items and their current state, keyed by name.
#[derive(Default)]
pub struct InMemoryItemRegistry {
    items: RwLock<HashMap<String, ItemSnapshot>>,
    posted: Mutex<Vec<(String, Command)>>,
    sink: RwLock<Option<Arc<dyn UpdateSink>>>,
}

impl std::fmt::Debug for InMemoryItemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryItemRegistry")
            .field("items", &self.items.read().unwrap_or_else(|e| e.into_inner()).len())
            .finish_non_exhaustive()
    }
}

impl InMemoryItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = ItemSnapshot>) -> Self {
        let registry = Self::new();
        for item in items {
            registry.insert(item);
        }
        registry
    }

    /// Adds or replaces an item.
    pub fn insert(&self, item: ItemSnapshot) {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item.name.clone(), item);
    }

    /// Sets the sink that receives state changes.
    pub fn set_update_sink(&self, sink: Arc<dyn UpdateSink>) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    /// Changes an item's state as the host would, and reports it.
    ///
    /// Returns `false` if there is no such item.
    pub fn update_state(&self, name: &str, state: ItemState) -> bool {
        {
            let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
            match items.get_mut(name) {
                Some(item) => item.state = state.clone(),
                None => return false,
            }
        }
        self.report(name, &state);
        true
    }

    /// Every command posted so far, in order.
    pub fn posted_commands(&self) -> Vec<(String, Command)> {
        self.posted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn report(&self, name: &str, state: &ItemState) {
        let sink = self.sink.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            sink.send_item_update(name, state);
        }
    }
}

impl ItemLookup for InMemoryItemRegistry {
    fn get(&self, name: &str) -> Option<ItemSnapshot> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

impl AutomationBus for InMemoryItemRegistry {
    fn post_command(&self, item: &str, command: Command) {
        info!(item, %command, "command received");
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((item.to_string(), command.clone()));

        let next = self
            .get(item)
            .and_then(|snapshot| snapshot.state.after_command(snapshot.kind, &command));
        match next {
            Some(state) => {
                self.update_state(item, state);
            }
            None => debug!(item, %command, "command leaves state unchanged"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_core::ItemKind;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<(String, String)>>,
    }

    impl UpdateSink for RecordingSink {
        fn send_item_update(&self, item: &str, state: &ItemState) {
            self.updates
                .lock()
                .unwrap()
                .push((item.to_string(), state.as_str().to_string()));
        }
    }

    fn light(state: &str) -> ItemSnapshot {
        ItemSnapshot {
            name: "Kitchen_Light".to_string(),
            kind: ItemKind::Switch,
            state: ItemState(state.to_string()),
        }
    }

    #[test]
    fn test_lookup_returns_seeded_item() {
        let registry = InMemoryItemRegistry::with_items([light("ON")]);
        assert_eq!(registry.get("Kitchen_Light"), Some(light("ON")));
        assert_eq!(registry.get("Nope"), None);
    }

    #[test]
    fn test_post_command_updates_state_and_reports() {
        // Arrange
        let registry = InMemoryItemRegistry::with_items([light("ON")]);
        let sink = Arc::new(RecordingSink::default());
        registry.set_update_sink(sink.clone());

        // Act
        registry.post_command("Kitchen_Light", Command::Off);

        // Assert
        assert_eq!(registry.get("Kitchen_Light").unwrap().state.as_str(), "OFF");
        assert_eq!(
            registry.posted_commands(),
            vec![("Kitchen_Light".to_string(), Command::Off)]
        );
        assert_eq!(
            *sink.updates.lock().unwrap(),
            vec![("Kitchen_Light".to_string(), "OFF".to_string())]
        );
    }

    #[test]
    fn test_refresh_is_recorded_but_changes_nothing() {
        let registry = InMemoryItemRegistry::with_items([light("ON")]);
        let sink = Arc::new(RecordingSink::default());
        registry.set_update_sink(sink.clone());

        registry.post_command("Kitchen_Light", Command::Refresh);

        assert_eq!(registry.posted_commands().len(), 1);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_state_of_unknown_item_returns_false() {
        let registry = InMemoryItemRegistry::new();
        assert!(!registry.update_state("Ghost", ItemState::null()));
    }
}
