/// Configuration and utility functions for the history engine.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maximum number of history entries kept per deck.
/// Oldest entries are evicted when this limit is exceeded.
const DEFAULT_MAX_HISTORY_SIZE: usize = 50;

/// Time window in milliseconds within which consecutive actions
/// are considered for implicit grouping.
const DEFAULT_GROUPING_TIME_WINDOW_MS: u64 = 1000;

/// Environment variable overriding the persistence directory.
const DATA_DIR_ENV: &str = "SLIDE_HISTORY_DATA_DIR";

/// Configuration for the history engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Max history entries per deck.
    pub max_history_size: usize,
    /// Outer grouping window in milliseconds.
    pub grouping_time_window_ms: u64,
    /// Root directory for the persistence database.
    pub data_dir: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            grouping_time_window_ms: DEFAULT_GROUPING_TIME_WINDOW_MS,
            data_dir: resolve_data_dir(),
        }
    }
}

impl HistoryConfig {
    /// Returns the config file path: exe directory + `slide-history.json`.
    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("slide-history.json")))
            .unwrap_or_else(|| PathBuf::from("slide-history.json"))
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (unreadable file, parse error, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<HistoryConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {}: {e}", path.display());
                }
            }
            // Don't overwrite a broken file
            let mut config = Self::default();
            config.sanitize();
            config
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to create default config at {}: {e}", path.display());
            }
            config
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Clamps values to valid ranges. The history bound is at least one.
    pub fn sanitize(&mut self) {
        self.max_history_size = self.max_history_size.max(1);
    }
}

/// Resolves the data directory path.
///
/// Resolution order:
/// 1. `SLIDE_HISTORY_DATA_DIR` environment variable
/// 2. Platform data directory + `slide-history`
/// 3. `.data/` in the working directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("slide-history"))
        .unwrap_or_else(|| PathBuf::from(".data"))
}

/// Generates a deck ID for a file on disk.
///
/// Uses a hash of the canonical path for stability across sessions.
pub fn doc_id_for_path(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("deck-{:016x}", hasher.finish())
}
