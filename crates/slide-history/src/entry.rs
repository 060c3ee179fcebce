/// History entries and the serializable snapshot of a whole history.
use serde::{Deserialize, Serialize};

use crate::action::Action;

/// One undoable unit: the action plus the deck before and after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<S> {
    pub action: Action,
    pub before_state: Vec<S>,
    pub after_state: Vec<S>,
}

/// Everything needed to rebuild a `HistoryManager` for a deck.
///
/// Open grouping sessions and last-action tracking are not captured,
/// so a restored history always starts a fresh undo group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot<S> {
    pub entries: Vec<HistoryEntry<S>>,
    pub current_index: Option<usize>,
    pub initial_state: Vec<S>,
    pub current_state: Vec<S>,
}

impl<S> Default for HistorySnapshot<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            current_index: None,
            initial_state: Vec::new(),
            current_state: Vec::new(),
        }
    }
}
