/// Core undo/redo manager for slide decks.
///
/// Every edit is recorded as a before/after pair of deck snapshots. Rapid
/// text edits of the same element merge into one entry; callers can also
/// bracket a run of edits into a single `batch` entry with
/// `start_group`/`end_group`. History can optionally be flushed to disk.
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::{Action, ActionKind, LastAction};
use crate::clock::{Clock, SystemClock};
use crate::config::HistoryConfig;
use crate::deck::{is_blank_deck, SlideContent};
use crate::entry::{HistoryEntry, HistorySnapshot};
use crate::grouping::can_group_with_last_action;
use crate::persistence::PersistenceLayer;
use crate::session::GroupSession;

/// Manages undo/redo history for a single deck.
///
/// The manager keeps its own copy of the deck ("tracked state"). States go
/// in and come out as clones, so nothing the caller holds aliases anything
/// stored in history.
pub struct HistoryManager<S> {
    /// Recorded entries, oldest first.
    entries: Vec<HistoryEntry<S>>,
    /// Last applied entry. `None` means nothing is applied.
    current_index: Option<usize>,
    /// Mirror of the caller's live deck.
    current_state: Vec<S>,
    /// Deck the manager was created with.
    initial_state: Vec<S>,
    /// Grouping-relevant view of the last recorded action.
    last_action: Option<LastAction>,
    /// Open explicit grouping session, if any.
    session: Option<GroupSession<S>>,
    /// Whether recording is active.
    recording: bool,
    /// Deck identifier used as the persistence key.
    doc_id: String,
    config: HistoryConfig,
    clock: Arc<dyn Clock>,
    /// Optional disk persistence (None = in-memory only).
    persistence: Option<Arc<PersistenceLayer>>,
    /// Whether in-memory state has changed since the last flush.
    dirty: bool,
}

impl<S> std::fmt::Debug for HistoryManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("doc_id", &self.doc_id)
            .field("entries_len", &self.entries.len())
            .field("current_index", &self.current_index)
            .field("grouping", &self.session.is_some())
            .field("recording", &self.recording)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<S: SlideContent + Clone + PartialEq> HistoryManager<S> {
    /// Creates a manager with an empty history.
    ///
    /// Pass `persistence: None` for in-memory-only mode.
    pub fn new(
        doc_id: String,
        initial_state: &[S],
        mut config: HistoryConfig,
        persistence: Option<Arc<PersistenceLayer>>,
    ) -> Self {
        config.sanitize();
        Self {
            entries: Vec::new(),
            current_index: None,
            current_state: initial_state.to_vec(),
            initial_state: initial_state.to_vec(),
            last_action: None,
            session: None,
            recording: true,
            doc_id,
            config,
            clock: Arc::new(SystemClock),
            persistence,
            dirty: false,
        }
    }

    /// Creates an in-memory-only manager with default config.
    pub fn in_memory(initial_state: &[S]) -> Self {
        Self::new(String::from("deck"), initial_state, HistoryConfig::default(), None)
    }

    /// Rebuilds a manager from a stored snapshot.
    ///
    /// The size bound of `config` is re-applied, evicting the oldest
    /// entries, and the cursor is clamped into range.
    pub fn from_snapshot(
        doc_id: String,
        snapshot: HistorySnapshot<S>,
        config: HistoryConfig,
        persistence: Option<Arc<PersistenceLayer>>,
    ) -> Self {
        let HistorySnapshot {
            mut entries,
            current_index,
            initial_state,
            current_state,
        } = snapshot;

        let mut mgr = Self::new(doc_id, &initial_state, config, persistence);
        let mut current_index = current_index;

        if let Some(i) = current_index {
            if i >= entries.len() {
                tracing::warn!(
                    "Deck {}: stored cursor {i} out of range for {} entries",
                    mgr.doc_id,
                    entries.len()
                );
                current_index = entries.len().checked_sub(1);
            }
        }

        // Over the limit: redo entries go first, so the cursor never lands
        // inside the evicted prefix.
        let max = mgr.config.max_history_size;
        if entries.len() > max {
            let applied = current_index.map_or(0, |i| i + 1);
            entries.truncate(max.max(applied));
            let excess = entries.len().saturating_sub(max);
            entries.drain(..excess);
            current_index = current_index.map(|i| i - excess);
            tracing::debug!(
                "Deck {}: trimmed stored history to {} entries",
                mgr.doc_id,
                entries.len()
            );
        }

        if current_index.is_none()
            && entries
                .first()
                .is_some_and(|e| e.before_state != current_state)
        {
            tracing::warn!(
                "Deck {}: stored redo entries don't start from the stored deck, dropping them",
                mgr.doc_id
            );
            entries.clear();
        }

        mgr.entries = entries;
        mgr.current_index = current_index;
        mgr.current_state = current_state;
        mgr.debug_check_invariants();
        mgr
    }

    /// Replaces the clock used to stamp actions and evaluate grouping.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the deck ID.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Creates an action stamped with this manager's clock.
    pub fn action(&self, kind: ActionKind, description: impl Into<String>) -> Action {
        Action::new(kind, description).at(self.clock.now_ms())
    }

    /// Records `action` as having turned the tracked deck into `new_state`.
    ///
    /// Does nothing if `new_state` equals the tracked deck. Inside an
    /// explicit grouping session the action is only queued for the batch.
    /// Otherwise it either merges into the current entry (consecutive text
    /// edits) or becomes a new entry, discarding any redo entries.
    pub fn execute_action(&mut self, action: Action, new_state: &[S]) {
        if !self.recording {
            if self.current_state.as_slice() != new_state {
                self.current_state = new_state.to_vec();
                self.entries.truncate(self.next_index());
                self.last_action = None;
                self.dirty = true;
                self.debug_check_invariants();
            }
            return;
        }

        if self.current_state.as_slice() == new_state {
            tracing::trace!("Deck {}: ignoring no-op {}", self.doc_id, action.kind);
            return;
        }

        let after_state = new_state.to_vec();
        let before_state = std::mem::replace(&mut self.current_state, after_state.clone());

        if let Some(session) = self.session.as_mut() {
            session.push(action);
            return;
        }

        let last = LastAction::from(&action);
        let now = self.clock.now_ms();
        let merge_into = self.current_index.filter(|_| {
            can_group_with_last_action(
                self.last_action.as_ref(),
                &action,
                now,
                self.config.grouping_time_window_ms,
            )
        });

        if let Some(index) = merge_into {
            let entry = &mut self.entries[index];
            entry.after_state = after_state;
            entry.action.timestamp = action.timestamp;
            tracing::debug!(
                "Deck {}: merged \"{}\" into entry {index}",
                self.doc_id,
                action.description
            );
            entry.action.description = action.description;
        } else {
            self.push_entry(HistoryEntry {
                action,
                before_state,
                after_state,
            });
        }

        self.last_action = Some(last);
        self.dirty = true;
        self.debug_check_invariants();
    }

    /// Steps back one entry and returns the deck to apply.
    ///
    /// Returns `None` if there's nothing to undo, or if undoing would take
    /// a deck that started non-empty back to a blank one.
    pub fn undo(&mut self) -> Option<Vec<S>> {
        if self.session.is_some() {
            self.end_group();
        }

        let index = self.current_index?;
        let before_state = &self.entries[index].before_state;
        if index == 0 && is_blank_deck(before_state) && !self.initial_state.is_empty() {
            tracing::debug!("Deck {}: refusing to undo back to a blank deck", self.doc_id);
            return None;
        }

        let state = before_state.clone();
        self.current_state = state.clone();
        self.current_index = index.checked_sub(1);
        self.last_action = None;
        self.dirty = true;
        self.debug_check_invariants();
        Some(state)
    }

    /// Re-applies the next entry and returns the deck to apply.
    ///
    /// Returns `None` if there's nothing to redo.
    pub fn redo(&mut self) -> Option<Vec<S>> {
        if self.session.is_some() {
            self.end_group();
        }

        let next = self.next_index();
        let state = self.entries.get(next)?.after_state.clone();
        self.current_index = Some(next);
        self.current_state = state.clone();
        self.last_action = None;
        self.dirty = true;
        self.debug_check_invariants();
        Some(state)
    }

    /// Drops all entries and any open grouping session.
    ///
    /// The tracked deck itself is left alone.
    pub fn clear_history(&mut self) {
        self.entries.clear();
        self.current_index = None;
        self.last_action = None;
        self.session = None;
        self.dirty = true;
    }

    /// Opens an explicit grouping session.
    ///
    /// An already open session is committed first. An empty description
    /// yields "Batch of N actions" on commit.
    pub fn start_group(&mut self, description: impl Into<String>) {
        if self.session.is_some() {
            self.end_group();
        }
        self.session = Some(GroupSession::new(description.into(), self.current_state.clone()));
    }

    /// Closes the open grouping session and commits it as one `batch` entry.
    ///
    /// No-op without an open session or when no action was recorded in it.
    pub fn end_group(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.is_empty() {
            return;
        }

        let after_state = self.current_state.clone();
        if session.start_state == after_state {
            tracing::debug!(
                "Deck {}: group of {} actions left the deck unchanged",
                self.doc_id,
                session.actions.len()
            );
            self.last_action = None;
            return;
        }

        let description = session.batch_description();
        let action = Action::batch(description, session.actions, self.clock.now_ms());
        tracing::debug!(
            "Deck {}: committed batch \"{}\" ({} actions)",
            self.doc_id,
            action.description,
            action.metadata.action_count.unwrap_or(0)
        );

        self.last_action = Some(LastAction::from(&action));
        self.push_entry(HistoryEntry {
            action,
            before_state: session.start_state,
            after_state,
        });
        self.dirty = true;
        self.debug_check_invariants();
    }

    /// Forces a group break so the next action starts a new entry.
    pub fn force_group_break(&mut self) {
        self.last_action = None;
    }

    /// Temporarily disables recording. The tracked deck still follows
    /// `execute_action` calls; a change made while paused drops the redo
    /// entries and ends implicit grouping.
    pub fn pause_recording(&mut self) {
        self.recording = false;
    }

    /// Re-enables recording after a pause.
    pub fn resume_recording(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn can_undo(&self) -> bool {
        self.current_index.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.next_index() < self.entries.len()
    }

    /// The action of the last applied entry.
    pub fn current_action(&self) -> Option<&Action> {
        self.current_index
            .and_then(|i| self.entries.get(i))
            .map(|e| &e.action)
    }

    /// Number of entries, including redo entries.
    pub fn history_size(&self) -> usize {
        self.entries.len()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn entries(&self) -> &[HistoryEntry<S>] {
        &self.entries
    }

    pub fn current_state(&self) -> &[S] {
        &self.current_state
    }

    pub fn initial_state(&self) -> &[S] {
        &self.initial_state
    }

    /// Whether an explicit grouping session is open.
    pub fn is_grouping(&self) -> bool {
        self.session.is_some()
    }

    /// Copies the persistent part of the history.
    pub fn snapshot(&self) -> HistorySnapshot<S> {
        HistorySnapshot {
            entries: self.entries.clone(),
            current_index: self.current_index,
            initial_state: self.initial_state.clone(),
            current_state: self.current_state.clone(),
        }
    }

    fn next_index(&self) -> usize {
        self.current_index.map_or(0, |i| i + 1)
    }

    /// Drops redo entries, appends `entry`, evicts the oldest entries over
    /// the limit and moves the cursor onto the new tail.
    fn push_entry(&mut self, entry: HistoryEntry<S>) {
        self.entries.truncate(self.next_index());
        self.entries.push(entry);

        let max = self.config.max_history_size;
        if self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
            tracing::debug!("Deck {}: evicted {excess} oldest entries", self.doc_id);
        }
        self.current_index = self.entries.len().checked_sub(1);
    }

    fn debug_check_invariants(&self) {
        debug_assert!(self.entries.len() <= self.config.max_history_size);
        debug_assert!(self.current_index.is_none_or(|i| i < self.entries.len()));
        debug_assert!(
            self.current_index.is_some()
                || self
                    .entries
                    .first()
                    .is_none_or(|e| e.before_state == self.current_state)
        );
    }
}

impl<S> HistoryManager<S>
where
    S: SlideContent + Clone + PartialEq + Serialize + DeserializeOwned,
{
    /// Loads stored history for `doc_id`, or creates a fresh manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence layer fails to read.
    pub fn load_or_new(
        doc_id: String,
        initial_state: &[S],
        config: HistoryConfig,
        persistence: Option<Arc<PersistenceLayer>>,
    ) -> Result<Self> {
        let stored = match &persistence {
            Some(pl) => pl
                .read_snapshot::<S>(&doc_id)
                .context("Failed to load history from disk")?,
            None => None,
        };

        Ok(match stored {
            Some(snapshot) => Self::from_snapshot(doc_id, snapshot, config, persistence),
            None => Self::new(doc_id, initial_state, config, persistence),
        })
    }

    /// Writes the history to disk.
    ///
    /// No-op if the manager is in-memory-only or nothing has changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk write fails.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(pl) = &self.persistence {
            pl.write_snapshot(&self.doc_id, &self.snapshot())
                .context("Failed to flush history to disk")?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Clears the history from memory and disk.
    ///
    /// # Errors
    ///
    /// Returns an error if disk cleanup fails.
    pub fn delete_history(&mut self) -> Result<()> {
        self.clear_history();
        self.dirty = false;

        if let Some(pl) = &self.persistence {
            pl.delete_document(&self.doc_id)
                .context("Failed to clear history from disk")?;
        }
        Ok(())
    }
}
