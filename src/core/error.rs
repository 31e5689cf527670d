//! Error taxonomy for cache resolution, rendering state and migration
//!
//! Row-level failures (validation, missing files, tool failures) are reported
//! per row and never abort a batch. Store failures and cancellation abort the
//! whole operation, since every later decision depends on a consistent store.

use std::path::PathBuf;

use crate::core::model::ReelIssue;

/// Result alias used by the cache and render modules
pub type Result<T> = std::result::Result<T, ReelError>;

#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    /// Malformed or missing row input (e.g. an empty link)
    #[error("invalid input: {0}")]
    Validation(String),

    /// A referenced local file or directory does not exist
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// An external downloader/prober exited non-zero or produced unusable output
    #[error("{tool} failed: {message}{}", log_hint(log))]
    ToolExecution {
        tool: String,
        message: String,
        log: Option<PathBuf>,
    },

    /// The persisted cache index or render state could not be read or written
    #[error("store {} unavailable: {source}", path.display())]
    IndexIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller's cancellation token fired while a subprocess was in flight
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!(" (see log: {})", path.display()),
        None => String::new(),
    }
}

impl ReelError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReelError::Validation(message.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>, log: Option<PathBuf>) -> Self {
        ReelError::ToolExecution {
            tool: tool.into(),
            message: message.into(),
            log,
        }
    }

    pub fn index_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReelError::IndexIo {
            path: path.into(),
            source,
        }
    }

    /// True when the failure only affects the current row and a batch may continue
    pub fn is_row_fatal(&self) -> bool {
        !matches!(self, ReelError::IndexIo { .. } | ReelError::Cancelled)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ReelError::Validation(_) => "VALIDATION",
            ReelError::NotFound { .. } => "NOT_FOUND",
            ReelError::ToolExecution { .. } => "TOOL_FAILED",
            ReelError::IndexIo { .. } => "INDEX_IO",
            ReelError::Cancelled => "CANCELLED",
            ReelError::Io(_) => "IO",
        }
    }

    /// Per-row log file attached to a tool failure, if any
    pub fn log_path(&self) -> Option<&PathBuf> {
        match self {
            ReelError::ToolExecution { log, .. } => log.as_ref(),
            _ => None,
        }
    }

    pub fn to_issue(&self) -> ReelIssue {
        ReelIssue::new(self.code(), self.to_string())
    }
}
