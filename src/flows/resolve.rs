//! Resolve flow - Batch resolution of references into the project cache

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::cache::fetch::FetchEngine;
use crate::cache::index::CacheIndex;
use crate::cache::resolve::{ResolveOutcome, ResolveRequest, Resolver, RowResult};
use crate::core::config::Settings;
use crate::core::model::{Kind, Meta, Record, RecordSet};
use crate::core::output::{OutputConfig, Renderer};
use crate::core::util::CancelToken;

/// Read one reference per line; blank lines and `#` comments are skipped
pub fn read_rows(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rows file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn outcome_record(row: usize, reference: &str, outcome: &ResolveOutcome) -> Record {
    let entry = &outcome.entry;
    Record::new(Kind::Resolve)
        .with_id(entry.identifier.clone())
        .with_path(entry.cached_path.clone())
        .with_status(outcome.status.as_str())
        .with_data(serde_json::json!({
            "row": row,
            "reference": reference,
            "source_type": entry.source_type,
            "probed": outcome.probed,
            "updated": outcome.updated,
            "format": entry.probe.as_ref().map(|p| p.format_name.clone()),
        }))
        .with_meta(Meta {
            size: u64::try_from(entry.size_bytes).ok(),
            duration_s: entry.probe.as_ref().map(|p| p.duration_s),
            ..Default::default()
        })
}

fn row_record(row: &RowResult) -> Record {
    match &row.result {
        Ok(outcome) => outcome_record(row.row, &row.reference, outcome),
        Err(e) => {
            let mut record = Record::new(Kind::Resolve)
                .with_id(row.reference.clone())
                .with_status("failed")
                .with_error(e.to_issue());
            if let Some(log) = e.log_path() {
                record = record.with_data(serde_json::json!({
                    "row": row.row,
                    "log": log.to_string_lossy(),
                }));
            }
            record
        }
    }
}

/// Resolve `requests` sequentially against the project index
///
/// The index is saved once at the end, and only if some row changed it.
/// Batch-fatal errors return early without saving.
pub fn resolve_records(
    settings: &Settings,
    engine: &FetchEngine,
    requests: &[ResolveRequest],
    cancel: &CancelToken,
) -> Result<(RecordSet, usize)> {
    let index_path = settings.cache.index_path();
    let mut index = CacheIndex::load(&index_path)?;

    let resolver = Resolver::new(&settings.root, engine);
    let rows = resolver.resolve_batch(cancel, settings.fetch_timeout, &mut index, requests)?;

    let changed = rows
        .iter()
        .any(|r| r.result.as_ref().map(|o| o.updated).unwrap_or(false));
    if changed {
        index
            .save(&index_path)
            .with_context(|| format!("Failed to save cache index {}", index_path.display()))?;
    }

    let failed = rows.iter().filter(|r| r.result.is_err()).count();
    Ok((rows.iter().map(row_record).collect(), failed))
}

/// Run the resolve command
pub fn run_resolve(
    settings: &Settings,
    references: &[String],
    rows_file: Option<&Path>,
    force: bool,
    reprobe: bool,
    config: OutputConfig,
) -> Result<()> {
    let mut refs: Vec<String> = references.to_vec();
    if let Some(path) = rows_file {
        refs.extend(read_rows(path)?);
    }
    if refs.is_empty() {
        bail!("No references given (pass REF arguments or --rows FILE)");
    }

    let requests: Vec<ResolveRequest> = refs
        .into_iter()
        .map(|reference| ResolveRequest {
            reference,
            force,
            reprobe,
        })
        .collect();

    let engine = FetchEngine::from_settings(settings);
    let (records, failed) = resolve_records(settings, &engine, &requests, &CancelToken::new())?;
    Renderer::with_config(config).print(&records);

    if failed > 0 {
        bail!("{} of {} rows failed", failed, requests.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetch::fakes::harness;
    use tempfile::tempdir;

    #[test]
    fn test_read_rows_skips_comments() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rows.txt");
        fs::write(&path, "# header\nhttps://a\n\n  clip.mp4  \n").unwrap();
        assert_eq!(read_rows(&path).unwrap(), vec!["https://a", "clip.mp4"]);
    }

    #[test]
    fn test_batch_saves_once_and_reports_failures() {
        let temp = tempdir().unwrap();
        let settings = Settings::new(temp.path());
        let h = harness(&settings.cache, false, false);
        let requests = vec![
            ResolveRequest::new("https://example.com/v/1"),
            ResolveRequest::new(""),
            ResolveRequest::new("missing.mp4"),
        ];

        let (records, failed) =
            resolve_records(&settings, &h.engine, &requests, &CancelToken::new()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(failed, 2);
        assert_eq!(records.items[0].status.as_deref(), Some("downloaded"));
        assert_eq!(records.items[1].errors[0].code, "VALIDATION");
        assert_eq!(records.items[2].errors[0].code, "NOT_FOUND");

        let saved = CacheIndex::load(&settings.cache.index_path()).unwrap();
        assert!(saved.lookup("https://example.com/v/1").is_some());
    }

    #[test]
    fn test_unchanged_batch_does_not_write() {
        let temp = tempdir().unwrap();
        let settings = Settings::new(temp.path());
        let h = harness(&settings.cache, false, false);

        let (_, failed) = resolve_records(
            &settings,
            &h.engine,
            &[ResolveRequest::new("")],
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(failed, 1);
        assert!(!settings.cache.index_path().exists());
    }

    #[test]
    fn test_cancelled_batch_is_not_saved() {
        let temp = tempdir().unwrap();
        let settings = Settings::new(temp.path());
        let h = harness(&settings.cache, false, false);
        let cancel = CancelToken::new();
        cancel.cancel();

        let clip = temp.path().join("clip.mp4");
        fs::write(&clip, "x").unwrap();
        let result = resolve_records(
            &settings,
            &h.engine,
            &[ResolveRequest::new("clip.mp4")],
            &cancel,
        );
        assert!(result.is_err());
        assert!(!settings.cache.index_path().exists());
    }
}
