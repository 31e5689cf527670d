//! Cache flows - Inspect and prune the project cache index

use anyhow::{bail, Context, Result};

use crate::cache::index::{CacheIndex, Entry};
use crate::cache::source::{classify, identifier_key};
use crate::core::config::Settings;
use crate::core::model::{Kind, Meta, Record, RecordSet};
use crate::core::output::{OutputConfig, Renderer};

pub fn entry_record(entry: &Entry) -> Record {
    Record::new(Kind::Entry)
        .with_id(entry.identifier.clone())
        .with_path(entry.cached_path.clone())
        .with_status(if entry.is_live() { "live" } else { "missing" })
        .with_data(serde_json::json!({
            "key": identifier_key(&entry.identifier),
            "source_type": entry.source_type,
            "retrieved_at": entry.retrieved_at,
            "last_probe_at": entry.last_probe_at,
            "probe": entry.probe.as_ref().map(|p| serde_json::json!({
                "format_name": p.format_name,
                "format_long_name": p.format_long_name,
                "duration_s": p.duration_s,
            })),
            "notes": entry.notes,
        }))
        .with_meta(Meta {
            size: u64::try_from(entry.size_bytes).ok(),
            duration_s: entry.probe.as_ref().map(|p| p.duration_s),
            ..Default::default()
        })
}

pub fn list_entries(index: &CacheIndex) -> RecordSet {
    index.entries.values().map(entry_record).collect()
}

/// Find the entry for a raw reference: identifier, link, or local path
pub fn find_entry<'a>(settings: &Settings, index: &'a CacheIndex, reference: &str) -> Option<&'a Entry> {
    index.lookup(reference.trim()).or_else(|| {
        classify(&settings.root, reference)
            .ok()
            .and_then(|source| index.get(&source.identifier))
    })
}

pub fn prune_records(index: &mut CacheIndex, dry_run: bool) -> RecordSet {
    let report = index.prune_missing(dry_run);
    let meta = Meta {
        dry_run,
        ..Default::default()
    };

    let mut records: RecordSet = report
        .removed_entries
        .iter()
        .map(|id| {
            Record::new(Kind::Entry)
                .with_id(id.clone())
                .with_status("pruned")
                .with_meta(meta.clone())
        })
        .collect();
    records.push(
        Record::new(Kind::Summary)
            .with_status(if dry_run { "preview" } else { "pruned" })
            .with_data(serde_json::json!({
                "removed_entries": report.removed_entries.len(),
                "removed_links": report.removed_links,
            }))
            .with_meta(meta),
    );
    records
}

/// Run cache list command
pub fn run_list(settings: &Settings, config: OutputConfig) -> Result<()> {
    let index = CacheIndex::load(&settings.cache.index_path())?;
    Renderer::with_config(config).print(&list_entries(&index));
    Ok(())
}

/// Run cache show command
pub fn run_show(settings: &Settings, reference: &str, config: OutputConfig) -> Result<()> {
    let index = CacheIndex::load(&settings.cache.index_path())?;
    let Some(entry) = find_entry(settings, &index, reference) else {
        bail!("No cache entry for {}", reference);
    };

    let mut records = RecordSet::new();
    records.push(entry_record(entry));
    Renderer::with_config(config).print(&records);
    Ok(())
}

/// Run cache prune command
pub fn run_prune(settings: &Settings, dry_run: bool, config: OutputConfig) -> Result<()> {
    let index_path = settings.cache.index_path();
    let mut index = CacheIndex::load(&index_path)?;
    let before = index.clone();

    let records = prune_records(&mut index, dry_run);
    if !dry_run && index != before {
        index
            .save(&index_path)
            .with_context(|| format!("Failed to save cache index {}", index_path.display()))?;
    }

    Renderer::with_config(config).print(&records);
    Ok(())
}
