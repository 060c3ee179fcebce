/// Core types describing semantic edits to a slide deck.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// The closed set of edit kinds the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ElementUpdate,
    ElementAdd,
    ElementDelete,
    SlideAdd,
    SlideDelete,
    SlideReorder,
    SlideUpdate,
    /// Synthesized by an explicit grouping session.
    Batch,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ElementUpdate => "element_update",
            Self::ElementAdd => "element_add",
            Self::ElementDelete => "element_delete",
            Self::SlideAdd => "slide_add",
            Self::SlideDelete => "slide_delete",
            Self::SlideReorder => "slide_reorder",
            Self::SlideUpdate => "slide_update",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to an action.
///
/// `is_text_edit` drives implicit grouping; `actions` and `action_count`
/// are only populated on `batch` actions. Anything else the caller wants
/// to carry goes into `extra`, as string values.
///
/// Keys that are neither a typed field nor nested under `extra` are
/// ignored when deserializing. `extra` is not flattened because entries
/// are stored with bincode, which can't decode flattened maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionMetadata {
    pub is_text_edit: Option<bool>,
    pub actions: Vec<Action>,
    pub action_count: Option<usize>,
    pub extra: BTreeMap<String, String>,
}

/// A single semantic edit that produced a new deck state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Human-readable label, e.g. "Updated text".
    pub description: String,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    #[serde(default)]
    pub slide_id: Option<String>,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub metadata: ActionMetadata,
}

impl Action {
    /// Creates an action with a fresh id, stamped with the system clock.
    pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            id: generate_action_id(),
            kind,
            description: description.into(),
            timestamp: SystemClock.now_ms(),
            slide_id: None,
            element_id: None,
            metadata: ActionMetadata::default(),
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn on_slide(mut self, slide_id: impl Into<String>) -> Self {
        self.slide_id = Some(slide_id.into());
        self
    }

    pub fn on_element(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    pub fn text_edit(mut self, is_text_edit: bool) -> Self {
        self.metadata.is_text_edit = Some(is_text_edit);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// True only when the metadata explicitly marks this as a text edit.
    pub fn is_text_edit(&self) -> bool {
        self.metadata.is_text_edit == Some(true)
    }

    /// Builds the `batch` action that closes an explicit grouping session.
    pub(crate) fn batch(description: String, actions: Vec<Action>, timestamp: u64) -> Self {
        let action_count = actions.len();
        Self {
            id: generate_action_id(),
            kind: ActionKind::Batch,
            description,
            timestamp,
            slide_id: None,
            element_id: None,
            metadata: ActionMetadata {
                actions,
                action_count: Some(action_count),
                ..ActionMetadata::default()
            },
        }
    }
}

/// Generates a unique action id.
pub fn generate_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// What the grouper remembers about the most recently recorded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAction {
    pub kind: ActionKind,
    pub slide_id: Option<String>,
    pub element_id: Option<String>,
    pub is_text_edit: bool,
    pub timestamp: u64,
}

impl From<&Action> for LastAction {
    fn from(action: &Action) -> Self {
        Self {
            kind: action.kind,
            slide_id: action.slide_id.clone(),
            element_id: action.element_id.clone(),
            is_text_edit: action.is_text_edit(),
            timestamp: action.timestamp,
        }
    }
}
