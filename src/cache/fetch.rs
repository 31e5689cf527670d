//! Fetch engine - Download-or-copy plus metadata probe for a classified source
//!
//! The downloader and prober are constructor-injected strategies, so the
//! engine has no global hooks and tests can substitute counting fakes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backends::exec::{ExecContext, ToolLog};
use crate::backends::ffprobe::FfProbe;
use crate::backends::ytdlp::YtDlp;
use crate::cache::index::ProbeMetadata;
use crate::cache::source::identifier_key;
use crate::core::config::{CacheLayout, Settings};
use crate::core::error::{ReelError, Result};
use crate::core::util::{get_file_size, is_regular_file};

/// A file placed in the managed media directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Stable content id reported by the downloader, if any
    pub remote_id: Option<String>,
    pub notes: Vec<String>,
}

/// Downloads a remote reference into `dest_dir`, naming the result after `base_name`
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        ctx: &ExecContext,
        url: &str,
        dest_dir: &Path,
        base_name: &str,
        log: &ToolLog,
    ) -> Result<Fetched>;
}

/// Extracts media metadata from a local file
pub trait Prober: Send + Sync {
    fn probe(&self, ctx: &ExecContext, path: &Path, log: &ToolLog) -> Result<ProbeMetadata>;
}

pub struct FetchEngine {
    media_dir: PathBuf,
    logs_dir: PathBuf,
    downloader: Box<dyn Downloader>,
    prober: Box<dyn Prober>,
}

impl FetchEngine {
    pub fn new(
        layout: &CacheLayout,
        downloader: Box<dyn Downloader>,
        prober: Box<dyn Prober>,
    ) -> Self {
        Self {
            media_dir: layout.media_dir(),
            logs_dir: layout.logs_dir(),
            downloader,
            prober,
        }
    }

    /// Engine wired to the configured external tools
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.cache,
            Box::new(YtDlp::new(&settings.downloader)),
            Box::new(FfProbe::new(&settings.prober)),
        )
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Log path for a row; the same identifier always maps to the same file
    pub fn log_path(&self, identifier: &str) -> PathBuf {
        self.logs_dir.join(format!("{}.log", identifier_key(identifier)))
    }

    /// Create (truncate) the per-row log for `identifier`
    pub fn open_log(&self, identifier: &str) -> Result<ToolLog> {
        Ok(ToolLog::create(&self.log_path(identifier), identifier)?)
    }

    pub fn fetch_remote(
        &self,
        ctx: &ExecContext,
        identifier: &str,
        dest_base: &str,
        log: &ToolLog,
    ) -> Result<Fetched> {
        info!(identifier, "downloading");
        self.downloader
            .download(ctx, identifier, &self.media_dir, dest_base, log)
    }

    /// Copy a local source into the media directory as `<dest_base>.<ext>`
    ///
    /// The copy lands in a hidden partial file first and is renamed into
    /// place, so an interrupted copy never looks like a cached file.
    pub fn fetch_local(
        &self,
        ctx: &ExecContext,
        source_path: &Path,
        dest_base: &str,
        log: &ToolLog,
    ) -> Result<Fetched> {
        if ctx.cancel.is_cancelled() {
            return Err(ReelError::Cancelled);
        }
        if !is_regular_file(source_path) {
            log.note(&format!("source {} is not a readable file", source_path.display()));
            return Err(ReelError::NotFound {
                path: source_path.to_path_buf(),
            });
        }

        fs::create_dir_all(&self.media_dir)?;
        let file_name = match source_path.extension() {
            Some(ext) => format!("{}.{}", dest_base, ext.to_string_lossy().to_lowercase()),
            None => dest_base.to_string(),
        };
        let dest = self.media_dir.join(&file_name);
        let partial = self.media_dir.join(format!(".{}.partial", file_name));

        info!(source = %source_path.display(), dest = %dest.display(), "copying local source");
        let copied = fs::copy(source_path, &partial).and_then(|_| fs::rename(&partial, &dest));
        if let Err(e) = copied {
            let _ = fs::remove_file(&partial);
            log.note(&format!("copy failed: {}", e));
            return Err(if e.kind() == std::io::ErrorKind::NotFound {
                ReelError::NotFound {
                    path: source_path.to_path_buf(),
                }
            } else {
                ReelError::Io(e)
            });
        }

        let size_bytes = get_file_size(&dest)?;
        let note = format!("copied from {}", source_path.display());
        log.note(&note);
        debug!(dest = %dest.display(), size_bytes, "copy complete");

        Ok(Fetched {
            path: dest,
            size_bytes,
            remote_id: None,
            notes: vec![note],
        })
    }

    pub fn probe(&self, ctx: &ExecContext, path: &Path, log: &ToolLog) -> Result<ProbeMetadata> {
        debug!(path = %path.display(), "probing");
        self.prober.probe(ctx, path, log)
    }
}
