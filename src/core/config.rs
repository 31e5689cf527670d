//! Runtime settings resolved from CLI flags and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::paths::{absolutize, cache_dir};

pub const INDEX_FILE: &str = "index.json";
pub const RENDER_STATE_FILE: &str = "render_state.json";
pub const MEDIA_DIR: &str = "media";
pub const LOGS_DIR: &str = "logs";

/// On-disk layout shared by the project cache and the shared library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub dir: PathBuf,
}

impl CacheLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn render_state_path(&self) -> PathBuf {
        self.dir.join(RENDER_STATE_FILE)
    }

    /// Directory holding cached media files
    pub fn media_dir(&self) -> PathBuf {
        self.dir.join(MEDIA_DIR)
    }

    /// Directory holding per-row tool logs
    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join(LOGS_DIR)
    }
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Absolute project root; relative references resolve against it
    pub root: PathBuf,
    pub cache: CacheLayout,
    /// Shared library used as the migration target
    pub library: Option<CacheLayout>,
    /// Downloader executable (name in PATH or path)
    pub downloader: String,
    /// Prober executable (name in PATH or path)
    pub prober: String,
    /// Explicit per-invocation deadline for external tools
    pub fetch_timeout: Option<Duration>,
}

impl Settings {
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self {
            cache: CacheLayout::new(cache_dir(&root)),
            root,
            library: None,
            downloader: "yt-dlp".to_string(),
            prober: "ffprobe".to_string(),
            fetch_timeout: None,
        }
    }

    /// Override the project cache directory (relative paths resolve against root)
    pub fn with_cache_dir(mut self, dir: Option<&Path>) -> Self {
        if let Some(dir) = dir {
            self.cache = CacheLayout::new(absolutize(&self.root, dir));
        }
        self
    }

    pub fn with_library(mut self, dir: Option<&Path>) -> Self {
        self.library = dir.map(|d| CacheLayout::new(absolutize(&self.root, d)));
        self
    }

    pub fn with_tools(mut self, downloader: &str, prober: &str) -> Self {
        self.downloader = downloader.to_string();
        self.prober = prober.to_string();
        self
    }

    pub fn with_fetch_timeout(mut self, secs: Option<u64>) -> Self {
        self.fetch_timeout = secs.filter(|s| *s > 0).map(Duration::from_secs);
        self
    }
}
