/// Undo/redo history for slide decks.
///
/// Provides a `HistoryManager` that records before/after deck snapshots,
/// merges rapid text edits of the same element into one undo step, and
/// lets callers bracket multi-step interactions into a single `batch`
/// entry. History can be persisted per deck to an embedded key-value
/// store (redb) on disk.
pub mod action;
pub mod clock;
pub mod config;
pub mod deck;
pub mod entry;
pub mod grouping;
pub mod manager;
pub mod persistence;
pub mod session;

pub use action::{Action, ActionKind, ActionMetadata};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::HistoryConfig;
pub use deck::{ElementKind, Slide, SlideContent, SlideElement};
pub use entry::{HistoryEntry, HistorySnapshot};
pub use manager::HistoryManager;
pub use persistence::PersistenceLayer;
