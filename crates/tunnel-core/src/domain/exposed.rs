//! The allow-list of items the relay may command and observe.

use std::collections::HashSet;

/// Set of item names eligible for relay-originated commands and outbound
/// state sync.
///
/// The set is immutable; a configuration reload builds a new one and swaps
/// it in as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposedItemSet {
    names: HashSet<String>,
}

impl ExposedItemSet {
    /// An empty set: nothing is exposed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.names.contains(item)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExposedItemSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
