/// Disk persistence layer backed by redb.
///
/// Uses a single redb database file with three tables:
/// - `entries`: serialized `HistoryEntry` values keyed by `"{doc_id}#{index:020}"`
/// - `meta`: per-deck cursor and entry count keyed by `doc_id`
/// - `states`: the initial and tracked deck states keyed by `doc_id`
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entry::{HistoryEntry, HistorySnapshot};

/// Entries table: composite string key → bincode-serialized HistoryEntry.
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Metadata table: doc_id → bincode-serialized DocumentMeta.
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// States table: doc_id → bincode-serialized StoredStates.
const STATES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("states");

/// Per-deck metadata persisted alongside the entries.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentMeta {
    current_index: Option<u64>,
    entry_count: u64,
}

/// Initial and tracked deck states. Written from borrowed vectors,
/// read back as owned ones.
#[derive(Debug, Serialize, Deserialize)]
struct StoredStates<T> {
    initial_state: T,
    current_state: T,
}

/// Formats an entries table key from doc_id and entry position.
///
/// The position is zero-padded to 20 digits to ensure correct
/// lexicographic ordering in the B-tree.
fn entry_key(doc_id: &str, index: usize) -> String {
    format!("{doc_id}#{index:020}")
}

/// Returns the exclusive range bounds for all entries of a deck.
///
/// `$` is one ASCII codepoint above the `#` separator, so the range
/// captures exactly the entries for the given doc_id.
fn doc_range(doc_id: &str) -> (String, String) {
    let start = format!("{doc_id}#");
    let end = format!("{doc_id}$");
    (start, end)
}

/// Persistence layer for deck histories backed by redb.
///
/// Thread-safe: redb supports concurrent readers and serialized writers.
/// Shared across decks via `Arc<PersistenceLayer>`.
pub struct PersistenceLayer {
    db: Database,
}

impl std::fmt::Debug for PersistenceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceLayer").finish()
    }
}

impl PersistenceLayer {
    /// Opens or creates the history database in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("history.redb");
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open history database: {}", db_path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to create entries table")?;
            let _ = write_txn
                .open_table(META_TABLE)
                .context("Failed to create meta table")?;
            let _ = write_txn
                .open_table(STATES_TABLE)
                .context("Failed to create states table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        Ok(Arc::new(Self { db }))
    }

    /// Replaces everything stored for a deck with `snapshot`.
    ///
    /// The old entries, metadata and states are swapped out in a single
    /// transaction, so readers never see a half-written history.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write transaction fails.
    pub fn write_snapshot<S: Serialize>(
        &self,
        doc_id: &str,
        snapshot: &HistorySnapshot<S>,
    ) -> Result<()> {
        let meta = DocumentMeta {
            current_index: snapshot.current_index.map(|i| i as u64),
            entry_count: snapshot.entries.len() as u64,
        };
        let meta_bytes =
            bincode::serialize(&meta).context("Failed to serialize document metadata")?;
        let states = StoredStates {
            initial_state: &snapshot.initial_state,
            current_state: &snapshot.current_state,
        };
        let state_bytes = bincode::serialize(&states).context("Failed to serialize deck states")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open entries table")?;

            let (start, end) = doc_range(doc_id);
            let stale: Vec<String> = table
                .range::<&str>(start.as_str()..end.as_str())
                .context("Failed to range query for stale entries")?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            for key in &stale {
                table
                    .remove(key.as_str())
                    .context("Failed to remove stale entry")?;
            }

            for (index, entry) in snapshot.entries.iter().enumerate() {
                let key = entry_key(doc_id, index);
                let bytes =
                    bincode::serialize(entry).context("Failed to serialize history entry")?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .context("Failed to insert history entry")?;
            }
        }
        {
            let mut table = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            table
                .insert(doc_id, meta_bytes.as_slice())
                .context("Failed to insert metadata")?;
        }
        {
            let mut table = write_txn
                .open_table(STATES_TABLE)
                .context("Failed to open states table")?;
            table
                .insert(doc_id, state_bytes.as_slice())
                .context("Failed to insert deck states")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Reads the stored history for a deck.
    ///
    /// Returns `None` if nothing was ever written for this deck.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or deserialization fails.
    pub fn read_snapshot<S: DeserializeOwned>(
        &self,
        doc_id: &str,
    ) -> Result<Option<HistorySnapshot<S>>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let meta_table = read_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;
        let meta: DocumentMeta = match meta_table.get(doc_id).context("Failed to read metadata")? {
            Some(guard) => bincode::deserialize(guard.value())
                .context("Failed to deserialize metadata")?,
            None => return Ok(None),
        };

        let states_table = read_txn
            .open_table(STATES_TABLE)
            .context("Failed to open states table")?;
        let states: StoredStates<Vec<S>> =
            match states_table.get(doc_id).context("Failed to read deck states")? {
                Some(guard) => bincode::deserialize(guard.value())
                    .context("Failed to deserialize deck states")?,
                None => {
                    tracing::warn!("Deck {doc_id}: metadata present but deck states missing");
                    StoredStates {
                        initial_state: Vec::new(),
                        current_state: Vec::new(),
                    }
                }
            };

        let table = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open entries table")?;
        let (start, end) = doc_range(doc_id);
        let mut entries = Vec::new();
        for entry in table
            .range::<&str>(start.as_str()..end.as_str())
            .context("Failed to range query entries table")?
        {
            let (_, value_guard) = entry.context("Failed to read history entry")?;
            let entry: HistoryEntry<S> = bincode::deserialize(value_guard.value())
                .context("Failed to deserialize history entry")?;
            entries.push(entry);
        }

        if entries.len() as u64 != meta.entry_count {
            tracing::warn!(
                "Deck {doc_id}: metadata lists {} entries but {} were found",
                meta.entry_count,
                entries.len()
            );
        }

        Ok(Some(HistorySnapshot {
            entries,
            current_index: meta.current_index.map(|i| i as usize),
            initial_state: states.initial_state,
            current_state: states.current_state,
        }))
    }

    /// Counts the history entries stored for a deck.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn count_entries(&self, doc_id: &str) -> Result<usize> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open entries table")?;

        let (start, end) = doc_range(doc_id);
        let count = table
            .range::<&str>(start.as_str()..end.as_str())
            .context("Failed to range query for count")?
            .count();

        Ok(count)
    }

    /// Removes all entries, metadata and states for a deck.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn delete_document(&self, doc_id: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open entries table")?;

            let (start, end) = doc_range(doc_id);
            let keys_to_remove: Vec<String> = table
                .range::<&str>(start.as_str()..end.as_str())
                .context("Failed to range query for deletion")?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();

            for key in &keys_to_remove {
                table
                    .remove(key.as_str())
                    .context("Failed to remove entry")?;
            }
        }
        {
            let mut meta_table = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            let _ = meta_table.remove(doc_id);
        }
        {
            let mut states_table = write_txn
                .open_table(STATES_TABLE)
                .context("Failed to open states table")?;
            let _ = states_table.remove(doc_id);
        }
        write_txn.commit().context("Failed to commit deletion")?;
        Ok(())
    }

    /// Lists all deck IDs that have stored metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;

        let mut doc_ids = Vec::new();
        for entry in table.iter().context("Failed to iterate meta table")? {
            let (key_guard, _) = entry.context("Failed to read meta entry")?;
            doc_ids.push(key_guard.value().to_string());
        }
        Ok(doc_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind};
    use crate::deck::Slide;
    use tempfile::TempDir;

    fn make_entry(label: &str) -> HistoryEntry<Slide> {
        HistoryEntry {
            action: Action::new(ActionKind::ElementAdd, label).at(1),
            before_state: vec![Slide::new("s1")],
            after_state: vec![Slide::new("s1").with_text("t", label)],
        }
    }

    fn make_snapshot(labels: &[&str]) -> HistorySnapshot<Slide> {
        let entries: Vec<_> = labels.iter().map(|l| make_entry(l)).collect();
        let current_index = entries.len().checked_sub(1);
        HistorySnapshot {
            entries,
            current_index,
            initial_state: vec![Slide::new("s1")],
            current_state: vec![Slide::new("s1").with_text("t", "last")],
        }
    }

    fn open_test_db() -> (Arc<PersistenceLayer>, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        let pl = PersistenceLayer::open(dir.path()).expect("open db");
        (pl, dir)
    }

    #[test]
    fn test_open_creates_database() {
        let (pl, _dir) = open_test_db();
        let docs = pl.list_documents().expect("list docs");
        assert!(docs.is_empty());
    }

    #[test]
    fn test_write_and_read_snapshot() {
        let (pl, _dir) = open_test_db();
        let snapshot = make_snapshot(&["a", "b", "c"]);
        pl.write_snapshot("deck-1", &snapshot).expect("write");

        let loaded: HistorySnapshot<Slide> =
            pl.read_snapshot("deck-1").expect("read").expect("exists");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_read_missing_deck_is_none() {
        let (pl, _dir) = open_test_db();
        let loaded: Option<HistorySnapshot<Slide>> = pl.read_snapshot("nope").expect("read");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_rewrite_drops_stale_entries() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck", &make_snapshot(&["a", "b", "c", "d"]))
            .expect("write");
        pl.write_snapshot("deck", &make_snapshot(&["x"]))
            .expect("overwrite");

        assert_eq!(pl.count_entries("deck").expect("count"), 1);
        let loaded: HistorySnapshot<Slide> =
            pl.read_snapshot("deck").expect("read").expect("exists");
        assert_eq!(loaded.entries[0].action.description, "x");
        assert_eq!(loaded.current_index, Some(0));
    }

    #[test]
    fn test_missing_states_row_reads_empty_decks() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck", &make_snapshot(&["a", "b"]))
            .expect("write");

        let write_txn = pl.db.begin_write().expect("begin write");
        {
            let mut table = write_txn.open_table(STATES_TABLE).expect("open states");
            table.remove("deck").expect("remove states");
        }
        write_txn.commit().expect("commit");

        let loaded: HistorySnapshot<Slide> =
            pl.read_snapshot("deck").expect("read").expect("exists");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.current_index, Some(1));
        assert!(loaded.initial_state.is_empty());
        assert!(loaded.current_state.is_empty());
    }

    #[test]
    fn test_empty_snapshot_is_stored() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck", &HistorySnapshot::<Slide>::default())
            .expect("write");
        let loaded: HistorySnapshot<Slide> =
            pl.read_snapshot("deck").expect("read").expect("exists");
        assert!(loaded.entries.is_empty());
        assert_eq!(loaded.current_index, None);
    }

    #[test]
    fn test_delete_document() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck", &make_snapshot(&["a"])).expect("write");

        pl.delete_document("deck").expect("delete");

        assert_eq!(pl.count_entries("deck").expect("count"), 0);
        let loaded: Option<HistorySnapshot<Slide>> = pl.read_snapshot("deck").expect("read");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_multi_document_isolation() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck-a", &make_snapshot(&["a1", "a2"]))
            .expect("write a");
        pl.write_snapshot("deck-b", &make_snapshot(&["b1"]))
            .expect("write b");

        pl.delete_document("deck-a").expect("delete a");
        assert_eq!(pl.count_entries("deck-a").expect("count a"), 0);
        assert_eq!(pl.count_entries("deck-b").expect("count b"), 1);
    }

    #[test]
    fn test_list_documents() {
        let (pl, _dir) = open_test_db();
        pl.write_snapshot("deck-x", &make_snapshot(&["a"])).expect("write");
        pl.write_snapshot("deck-y", &make_snapshot(&["b"])).expect("write");

        let mut docs = pl.list_documents().expect("list");
        docs.sort();
        assert_eq!(docs, vec!["deck-x", "deck-y"]);
    }

    #[test]
    fn test_reopen_database_preserves_data() {
        let dir = TempDir::new().expect("create temp dir");
        {
            let pl = PersistenceLayer::open(dir.path()).expect("open");
            pl.write_snapshot("deck", &make_snapshot(&["persistent"]))
                .expect("write");
        }
        {
            let pl = PersistenceLayer::open(dir.path()).expect("reopen");
            let loaded: HistorySnapshot<Slide> =
                pl.read_snapshot("deck").expect("read").expect("exists");
            assert_eq!(loaded.entries[0].action.description, "persistent");
        }
    }
}
