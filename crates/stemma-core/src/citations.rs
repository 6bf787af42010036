//! Citation key cache over bibliography resources
//!
//! Dependent indexers (completion, reference lookup) consume this instead of
//! re-parsing bibliography files on every query. Thread-safe for concurrent
//! reads while the reconciliation loop writes.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, warn};

static BIB_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*@([A-Za-z]+)\s*\{\s*([^,\s{}]+)\s*,")
        .expect("bibliography entry pattern compiles")
});

/// One parsed bibliography entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// Entry kind as written: article, book, misc, ...
    pub kind: String,
    pub key: String,
}

/// Parsed citation data keyed by resource path.
pub struct CitationCache {
    entries: DashMap<PathBuf, Vec<Citation>>,
}

impl CitationCache {
    pub fn new() -> Self {
        CitationCache {
            entries: DashMap::new(),
        }
    }

    /// Parse a bibliography file and cache its entries, replacing whatever
    /// was cached for that path. An unreadable file is logged and leaves the
    /// cache untouched. Returns the number of entries indexed.
    pub fn index_file(&self, path: &Path) -> usize {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read bibliography file");
                return 0;
            }
        };
        let parsed: Vec<Citation> = BIB_ENTRY
            .captures_iter(&text)
            .map(|c| Citation {
                kind: c[1].to_ascii_lowercase(),
                key: c[2].to_string(),
            })
            .collect();
        let count = parsed.len();
        debug!(path = %path.display(), count, "bibliography indexed");
        self.entries.insert(path.to_path_buf(), parsed);
        count
    }

    /// Drop cached entries for a deleted resource. Forgetting an unknown
    /// path is not an error.
    pub fn forget(&self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn keys_for(&self, path: &Path) -> Vec<String> {
        self.entries
            .get(path)
            .map(|entries| entries.iter().map(|c| c.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Every cached key across all resources, sorted and deduplicated.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .flat_map(|entry| entry.value().iter().map(|c| c.key.clone()).collect::<Vec<_>>())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CitationCache {
    fn default() -> Self {
        Self::new()
    }
}
