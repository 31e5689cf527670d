//! Render plan - JSON description of the outputs to produce

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{ReelError, Result};
use crate::core::paths::absolutize;
use crate::render::fingerprint::{RenderConfig, Segment};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    #[serde(default)]
    pub config: RenderConfig,
    /// Default output filename template; segments may override it
    #[serde(default)]
    pub filename_template: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl RenderPlan {
    /// Load a plan, anchoring relative output paths at `root`
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ReelError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ReelError::Io(e)
            }
        })?;
        let plan: RenderPlan = serde_json::from_str(&content).map_err(|e| {
            ReelError::validation(format!("invalid render plan {}: {}", path.display(), e))
        })?;
        plan.resolve(root)
    }

    /// Absolutize output paths and fill overlay segments from named profiles
    pub fn resolve(mut self, root: &Path) -> Result<Self> {
        let mut seen = HashSet::new();
        for (index, segment) in self.segments.iter_mut().enumerate() {
            if segment.output_path.trim().is_empty() {
                return Err(ReelError::validation(format!(
                    "segment {} has no output_path",
                    index
                )));
            }
            let output = absolutize(root, Path::new(segment.output_path.trim()));
            segment.output_path = output.to_string_lossy().to_string();
            if !seen.insert(segment.output_path.clone()) {
                return Err(ReelError::validation(format!(
                    "segment {} duplicates output {}",
                    index, segment.output_path
                )));
            }

            if segment.resolved_overlay_segments.is_empty() {
                if let Some(profile) = self.config.overlay_profiles.get(&segment.overlay_profile_name) {
                    segment.resolved_overlay_segments = profile.segments.clone();
                }
            }
        }
        debug!(segments = self.segments.len(), "render plan loaded");
        Ok(self)
    }

    pub fn output_keys(&self) -> HashSet<String> {
        self.segments.iter().map(|s| s.output_path.clone()).collect()
    }
}
