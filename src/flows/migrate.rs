//! Migrate flow - Move the project cache into a shared library

use anyhow::{bail, Context, Result};

use crate::cache::index::CacheIndex;
use crate::cache::migrate::{Decision, MigrationItem, MigrationReport, Migrator};
use crate::core::config::{CacheLayout, Settings};
use crate::core::model::{Kind, Meta, Record, RecordSet, ReelIssue};
use crate::core::output::{OutputConfig, Renderer};

fn item_record(item: &MigrationItem, dry_run: bool) -> Record {
    let mut record = Record::new(Kind::Migration)
        .with_path(item.from.to_string_lossy())
        .with_status(item.decision.label())
        .with_data(serde_json::json!({
            "to": item.to,
            "recovered": item.recovered,
            "orphan": item.identifier.is_none(),
        }))
        .with_meta(Meta {
            dry_run,
            ..Default::default()
        });
    if let Some(id) = &item.identifier {
        record = record.with_id(id.clone());
    }
    if let Decision::Failed(message) = &item.decision {
        record = record.with_error(ReelIssue::new("IO", message.clone()));
    }
    record
}

pub fn report_records(report: &MigrationReport) -> RecordSet {
    let mut records: RecordSet = report
        .items
        .iter()
        .map(|item| item_record(item, report.dry_run))
        .collect();
    records.push(
        Record::new(Kind::Summary)
            .with_status(if report.dry_run { "preview" } else { "migrated" })
            .with_data(serde_json::to_value(&report.counts).unwrap_or_default())
            .with_meta(Meta {
                dry_run: report.dry_run,
                ..Default::default()
            }),
    );
    records
}

/// Migrate `source` into `target`, saving both indexes unless previewing
pub fn migrate(source: &CacheLayout, target: &CacheLayout, dry_run: bool) -> Result<MigrationReport> {
    let mut source_index = CacheIndex::load(&source.index_path())?;
    let mut target_index = CacheIndex::load(&target.index_path())?;

    let report = Migrator::new(source.media_dir(), target.media_dir())
        .dry_run(dry_run)
        .run(&mut source_index, &mut target_index)?;

    if !dry_run {
        target_index
            .save(&target.index_path())
            .context("Failed to save library index")?;
        source_index
            .save(&source.index_path())
            .context("Failed to save project index")?;
    }
    Ok(report)
}

/// Run the migrate command
pub fn run_migrate(settings: &Settings, dry_run: bool, config: OutputConfig) -> Result<()> {
    let Some(library) = &settings.library else {
        bail!("No library configured (pass --library DIR or set REEL_LIBRARY)");
    };

    let report = migrate(&settings.cache, library, dry_run)?;
    Renderer::with_config(config).print(&report_records(&report));

    if report.counts.failed > 0 {
        bail!("{} migration item(s) failed", report.counts.failed);
    }
    Ok(())
}
