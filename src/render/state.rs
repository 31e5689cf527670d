//! Render state store
//!
//! Maps each output path to the fingerprint that produced it. Loaded once,
//! mutated in memory, committed once per batch.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::store::{read_json_or_default, write_json_atomic};
use crate::core::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentState {
    pub input_hash: String,
    pub rendered_at: DateTime<Utc>,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub duration_s: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    #[serde(default)]
    pub global_config_hash: String,
    #[serde(default)]
    pub segments: BTreeMap<String, SegmentState>,
}

impl RenderState {
    /// Load the state; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        read_json_or_default(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, output_path: &str) -> Option<&SegmentState> {
        self.segments.get(output_path)
    }

    /// Drop entries whose output is not in `current_keys`; returns the removed keys
    pub fn prune(&mut self, current_keys: &HashSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .segments
            .keys()
            .filter(|k| !current_keys.contains(*k))
            .cloned()
            .collect();
        for key in &stale {
            self.segments.remove(key);
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), "pruned render state");
        }
        stale
    }

    /// Drop the entry for an output whose last render failed
    pub fn forget(&mut self, output_path: &str) -> bool {
        self.segments.remove(output_path).is_some()
    }

    /// Record a batch of successful renders under `global_hash`
    ///
    /// When the global hash changed, every segment not in `rendered` was
    /// produced under the old settings and is dropped.
    pub fn commit(&mut self, global_hash: &str, rendered: Vec<(String, SegmentState)>) {
        if self.global_config_hash != global_hash {
            let fresh: HashSet<&str> = rendered.iter().map(|(k, _)| k.as_str()).collect();
            self.segments.retain(|k, _| fresh.contains(k.as_str()));
            self.global_config_hash = global_hash.to_string();
        }
        self.segments.extend(rendered);
    }
}
