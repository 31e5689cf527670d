//! Unified Record Model
//!
//! Every command maps its outcome (resolve results, cache entries, render
//! actions, migration decisions) to this record model before rendering output.

use serde::{Deserialize, Serialize};

/// The kind of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Entry,
    Resolve,
    Action,
    Migration,
    Summary,
    Dependency,
    Error,
}

/// Metadata for a record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// File size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,

    /// Whether the record describes a preview that changed nothing
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Error information attached to a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelIssue {
    pub code: String,
    pub message: String,
}

impl ReelIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The unified record that all commands produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// The kind of this record
    pub kind: Kind,

    /// Cache identifier or output key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Filesystem path the record is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Short outcome label (cached, downloaded, render, moved, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Structured payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    pub meta: Meta,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ReelIssue>,
}

impl Record {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            id: None,
            path: None,
            status: None,
            data: None,
            meta: Meta::default(),
            errors: Vec::new(),
        }
    }

    /// Create a new error record
    pub fn error(issue: ReelIssue) -> Self {
        let mut record = Self::new(Kind::Error);
        record.errors.push(issue);
        record
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_error(mut self, issue: ReelIssue) -> Self {
        self.errors.push(issue);
        self
    }
}

/// Ordered collection of records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub items: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: Record) {
        self.items.push(item);
    }

    /// Number of records carrying at least one error
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|r| !r.errors.is_empty()).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
