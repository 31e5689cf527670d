//! Resolve orchestrator - raw reference to a cached, probed entry, exactly once
//!
//! Per request: classify, check for a cache hit, fetch on a miss (or when
//! forced), probe when the path changed / a reprobe was asked for / no probe is
//! stored, then write the entry back into the in-memory index. The index entry
//! is only replaced after every step succeeded; persisting the index is the
//! caller's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backends::exec::ExecContext;
use crate::cache::fetch::FetchEngine;
use crate::cache::index::{CacheIndex, Entry, SourceType};
use crate::cache::source::{classify, identifier_key};
use crate::core::error::{ReelError, Result};
use crate::core::util::CancelToken;

/// One row to resolve
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub reference: String,
    /// Re-fetch even on a cache hit
    pub force: bool,
    /// Re-run the probe even when one is stored
    pub reprobe: bool,
}

impl ResolveRequest {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStatus {
    Cached,
    Downloaded,
    Copied,
}

impl ResolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveStatus::Cached => "cached",
            ResolveStatus::Downloaded => "downloaded",
            ResolveStatus::Copied => "copied",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub entry: Entry,
    pub status: ResolveStatus,
    pub probed: bool,
    /// Whether the in-memory index changed
    pub updated: bool,
}

/// Outcome of one row in a batch
#[derive(Debug)]
pub struct RowResult {
    pub row: usize,
    pub reference: String,
    pub result: Result<ResolveOutcome>,
}

pub struct Resolver<'a> {
    root: &'a Path,
    engine: &'a FetchEngine,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a Path, engine: &'a FetchEngine) -> Self {
        Self { root, engine }
    }

    /// Resolve one request against `index`
    ///
    /// At most one fetch and one probe are attempted. On any error the index is
    /// left exactly as it was.
    pub fn resolve(
        &self,
        ctx: &ExecContext,
        index: &mut CacheIndex,
        request: &ResolveRequest,
    ) -> Result<ResolveOutcome> {
        let source = classify(self.root, &request.reference)?;
        let identifier = source.identifier.clone();
        let existing = index
            .get(&identifier)
            .filter(|e| e.source_type == source.source_type)
            .cloned();

        let hit = existing
            .as_ref()
            .map(|e| !request.force && e.is_live())
            .unwrap_or(false);

        let mut entry =
            existing.unwrap_or_else(|| Entry::new(identifier.clone(), source.source_type));
        let mut log = None;
        let mut path_set = false;

        let status = if hit {
            debug!(identifier = %identifier, "cache hit");
            ResolveStatus::Cached
        } else {
            let row_log = self.engine.open_log(&identifier)?;
            let key = identifier_key(&identifier);
            let fetched = match source.source_type {
                SourceType::Url => self.engine.fetch_remote(ctx, &identifier, &key, &row_log)?,
                SourceType::Local => {
                    let local = source
                        .local_path
                        .as_deref()
                        .ok_or_else(|| ReelError::NotFound {
                            path: PathBuf::from(&identifier),
                        })?;
                    self.engine.fetch_local(ctx, local, &key, &row_log)?
                }
            };

            entry.set_cached_path(&fetched.path);
            entry.size_bytes = fetched.size_bytes as i64;
            entry.retrieved_at = Some(Utc::now());
            entry.notes.extend(fetched.notes);
            path_set = true;
            log = Some(row_log);

            match source.source_type {
                SourceType::Url => ResolveStatus::Downloaded,
                SourceType::Local => ResolveStatus::Copied,
            }
        };

        let needs_probe = path_set || request.reprobe || entry.probe.is_none();
        if needs_probe {
            let row_log = match log.take() {
                Some(l) => l,
                None => self.engine.open_log(&identifier)?,
            };
            let cached = PathBuf::from(&entry.cached_path);
            let probe = self.engine.probe(ctx, &cached, &row_log)?;
            entry.probe = Some(probe);
            entry.last_probe_at = Some(Utc::now());
        }

        let mut updated = path_set || needs_probe;
        if updated {
            index.insert(entry.clone());
        }
        if source.source_type == SourceType::Url {
            updated |= index.link(request.reference.trim(), &identifier);
        }

        info!(
            identifier = %identifier,
            status = status.as_str(),
            probed = needs_probe,
            updated,
            "resolved"
        );

        Ok(ResolveOutcome {
            entry,
            status,
            probed: needs_probe,
            updated,
        })
    }

    /// Resolve rows sequentially, continuing past row-level failures
    ///
    /// Returns `Err` only for failures that invalidate the whole batch
    /// (store errors, cancellation); the index may then hold partial work and
    /// must not be saved.
    pub fn resolve_batch(
        &self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
        index: &mut CacheIndex,
        requests: &[ResolveRequest],
    ) -> Result<Vec<RowResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for (row, request) in requests.iter().enumerate() {
            let ctx = ExecContext::new(cancel.clone()).with_timeout(timeout);
            let result = self.resolve(&ctx, index, request);
            match result {
                Err(e) if !e.is_row_fatal() => {
                    warn!(row, reference = %request.reference, error = %e, "aborting batch");
                    return Err(e);
                }
                Err(ref e) => warn!(row, reference = %request.reference, error = %e, "row failed"),
                Ok(_) => {}
            }
            results.push(RowResult {
                row,
                reference: request.reference.clone(),
                result,
            });
        }
        Ok(results)
    }
}
