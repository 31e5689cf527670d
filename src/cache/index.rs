//! Cache index - Persisted entries keyed by identifier plus the raw-link table
//!
//! The index is a plain owned aggregate serialized wholesale on every save.
//! Unknown fields are ignored on load and missing optional fields default,
//! so files written by newer versions still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::cache::store::{read_json_or_default, write_json_atomic};
use crate::core::error::Result;
use crate::core::util::is_regular_file;

/// Current index format version
pub const INDEX_VERSION: u32 = 1;

/// Where a cached artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    Local,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Url => write!(f, "url"),
            SourceType::Local => write!(f, "local"),
        }
    }
}

/// Media metadata reported by the prober
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetadata {
    #[serde(default)]
    pub format_name: String,
    #[serde(default)]
    pub format_long_name: String,
    #[serde(default)]
    pub duration_s: f64,
    /// Raw `streams` array, kept verbatim
    #[serde(default)]
    pub streams_raw: serde_json::Value,
    /// Raw `format` object, kept verbatim
    #[serde(default)]
    pub format_raw: serde_json::Value,
    /// Entire prober document
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// One cached artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub identifier: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub cached_path: String,
    #[serde(default)]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_probe_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub probe: Option<ProbeMetadata>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Entry {
    pub fn new(identifier: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            identifier: identifier.into(),
            source_type,
            cached_path: String::new(),
            retrieved_at: None,
            last_probe_at: None,
            size_bytes: 0,
            probe: None,
            notes: Vec::new(),
        }
    }

    /// Cached file path, if one has been recorded
    pub fn cached_path(&self) -> Option<&Path> {
        if self.cached_path.is_empty() {
            None
        } else {
            Some(Path::new(&self.cached_path))
        }
    }

    /// True when the cached path points at an existing regular file
    pub fn is_live(&self) -> bool {
        self.cached_path().map(is_regular_file).unwrap_or(false)
    }

    pub fn set_cached_path(&mut self, path: &Path) {
        self.cached_path = path.to_string_lossy().to_string();
    }
}

/// Outcome of [`CacheIndex::prune_missing`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_entries: Vec<String>,
    pub removed_links: Vec<String>,
}

/// Persisted aggregate of entries and links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
    /// Raw remote reference -> identifier
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    /// Opaque extension data, preserved across load/save
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> u32 {
    INDEX_VERSION
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
            links: BTreeMap::new(),
            meta: serde_json::Map::new(),
        }
    }
}

impl CacheIndex {
    /// Load an index; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Self> {
        read_json_or_default(path)
    }

    /// Atomically persist the index
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, identifier: &str) -> Option<&Entry> {
        self.entries.get(identifier)
    }

    /// Find an entry by identifier or by a raw reference recorded in `links`
    pub fn lookup(&self, reference: &str) -> Option<&Entry> {
        self.entries.get(reference).or_else(|| {
            self.links
                .get(reference)
                .and_then(|id| self.entries.get(id))
        })
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.identifier.clone(), entry);
    }

    pub fn remove(&mut self, identifier: &str) -> Option<Entry> {
        self.entries.remove(identifier)
    }

    /// Record `raw -> identifier`; returns true when the table changed
    pub fn link(&mut self, raw: &str, identifier: &str) -> bool {
        if self.links.get(raw).map(String::as_str) == Some(identifier) {
            return false;
        }
        self.links.insert(raw.to_string(), identifier.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every non-empty cached path in the index
    pub fn referenced_paths(&self) -> HashSet<PathBuf> {
        self.entries
            .values()
            .filter_map(|e| e.cached_path().map(Path::to_path_buf))
            .collect()
    }

    /// Drop entries whose cached file is gone, then links that no longer resolve
    ///
    /// With `dry_run` the report is computed but the index is left untouched.
    pub fn prune_missing(&mut self, dry_run: bool) -> PruneReport {
        let removed_entries: Vec<String> = self
            .entries
            .values()
            .filter(|e| !e.is_live())
            .map(|e| e.identifier.clone())
            .collect();

        let removed_links: Vec<String> = self
            .links
            .iter()
            .filter(|(_, id)| {
                !self.entries.contains_key(*id) || removed_entries.contains(*id)
            })
            .map(|(raw, _)| raw.clone())
            .collect();

        if !dry_run {
            for id in &removed_entries {
                self.entries.remove(id);
            }
            for raw in &removed_links {
                self.links.remove(raw);
            }
        }

        PruneReport {
            removed_entries,
            removed_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url_entry(id: &str, path: &str) -> Entry {
        let mut entry = Entry::new(id, SourceType::Url);
        entry.cached_path = path.to_string();
        entry.size_bytes = 1234;
        entry.retrieved_at = Some(Utc::now());
        entry.notes.push("downloaded".to_string());
        entry
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index.json");

        let mut index = CacheIndex::default();
        let mut entry = url_entry("https://example.com/a", "/cache/a.mp4");
        entry.probe = Some(ProbeMetadata {
            format_name: "mov,mp4".to_string(),
            duration_s: 12.5,
            ..Default::default()
        });
        index.insert(entry);
        index.link("https://example.com/a", "https://example.com/a");
        index.save(&path).unwrap();

        let loaded = CacheIndex::load(&path).unwrap();
        assert_eq!(loaded.entries, index.entries);
        assert_eq!(loaded.links, index.links);
        assert_eq!(loaded.version, INDEX_VERSION);
    }

    #[test]
    fn test_load_tolerates_unknown_and_missing_fields() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index.json");
        std::fs::write(
            &path,
            r#"{
                "entries": {
                    "/abs/a.mp4": {
                        "identifier": "/abs/a.mp4",
                        "source_type": "local",
                        "future_field": [1, 2]
                    }
                },
                "meta": {"owner": "ci"},
                "extra_top_level": true
            }"#,
        )
        .unwrap();

        let index = CacheIndex::load(&path).unwrap();
        assert_eq!(index.version, INDEX_VERSION);
        let entry = index.get("/abs/a.mp4").unwrap();
        assert_eq!(entry.source_type, SourceType::Local);
        assert!(entry.cached_path.is_empty());
        assert!(entry.probe.is_none());
        assert!(index.links.is_empty());
        assert_eq!(index.meta["owner"], "ci");
    }

    #[test]
    fn test_lookup_via_links() {
        let mut index = CacheIndex::default();
        index.insert(url_entry("https://example.com/a", ""));
        assert!(index.link("https://youtu.be/a", "https://example.com/a"));
        assert!(!index.link("https://youtu.be/a", "https://example.com/a"));

        assert!(index.lookup("https://example.com/a").is_some());
        assert_eq!(
            index.lookup("https://youtu.be/a").unwrap().identifier,
            "https://example.com/a"
        );
        assert!(index.lookup("https://other").is_none());
    }

    #[test]
    fn test_prune_missing() {
        let temp = tempdir().unwrap();
        let live = temp.path().join("live.mp4");
        std::fs::write(&live, "data").unwrap();

        let mut index = CacheIndex::default();
        index.insert(url_entry("https://a", &live.to_string_lossy()));
        index.insert(url_entry("https://b", "/gone/b.mp4"));
        index.link("https://short/a", "https://a");
        index.link("https://short/b", "https://b");
        index.link("https://short/c", "https://never-indexed");

        let preview = index.prune_missing(true);
        assert_eq!(preview.removed_entries, vec!["https://b".to_string()]);
        assert_eq!(index.len(), 2);

        let report = index.prune_missing(false);
        assert_eq!(report, preview);
        assert_eq!(index.len(), 1);
        assert_eq!(index.links.len(), 1);
        assert!(index.links.contains_key("https://short/a"));
    }

    #[test]
    fn test_entry_is_live_rejects_directories() {
        let temp = tempdir().unwrap();
        let mut entry = Entry::new("x", SourceType::Local);
        assert!(!entry.is_live());
        entry.set_cached_path(temp.path());
        assert!(!entry.is_live());
    }
}
