/// Explicit grouping sessions: caller-bracketed runs of actions that
/// commit as a single `batch` entry.
use crate::action::Action;

/// An open grouping session.
#[derive(Debug, Clone)]
pub struct GroupSession<S> {
    /// Actions recorded since the session started, in order.
    pub actions: Vec<Action>,
    /// Deck state captured when the session started.
    pub start_state: Vec<S>,
    /// Caller-supplied label. Empty means "use the fallback".
    pub description: String,
}

impl<S> GroupSession<S> {
    pub fn new(description: String, start_state: Vec<S>) -> Self {
        Self {
            actions: Vec::new(),
            start_state,
            description,
        }
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Label for the committed batch entry.
    pub fn batch_description(&self) -> String {
        if self.description.is_empty() {
            format!("Batch of {} actions", self.actions.len())
        } else {
            self.description.clone()
        }
    }
}
