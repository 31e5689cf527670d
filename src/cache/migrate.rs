//! Cache migration - Move cached files from the project cache into a shared library
//!
//! Conflict policy, per source entry with a cached path:
//! 1. already under the target directory: `AlreadyTarget`, nothing to do
//! 2. file missing: look for a same-named file anywhere in the source
//!    directory and adopt it, otherwise `Skipped(not found)`
//! 3. destination is `<target>/<basename>`
//! 4. destination exists: same size is a duplicate (`Skipped(dedup)`, both
//!    indexes repointed at the destination); different size picks
//!    `<stem>-N.<ext>`
//! 5. target index already has a live entry for the identifier: `TargetWins`
//! 6. otherwise move the file and the entry: `Moved`
//!
//! Unreferenced files left in the source directory are then moved as orphans
//! (skipped when the destination name is taken), and source links missing
//! from the target are copied over. Nothing is ever deleted on failure.
//!
//! Decisions are made against a [`FsView`] that overlays planned moves on the
//! real filesystem, so a dry run walks exactly the same path as a real run
//! without touching disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::index::CacheIndex;
use crate::cache::store::ensure_dir;
use crate::core::error::Result;
use crate::core::paths::{absolutize, dedup_path, is_within};

/// Why an item was left in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    Dedup,
    DestinationExists,
}

/// Per-item migration decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    AlreadyTarget,
    Skipped(SkipReason),
    TargetWins,
    Moved,
    Failed(String),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::AlreadyTarget => "already_target",
            Decision::Skipped(SkipReason::NotFound) => "skipped_not_found",
            Decision::Skipped(SkipReason::Dedup) => "skipped_dedup",
            Decision::Skipped(SkipReason::DestinationExists) => "skipped_exists",
            Decision::TargetWins => "target_wins",
            Decision::Moved => "moved",
            Decision::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationItem {
    /// Identifier of the indexed entry; `None` for orphans
    pub identifier: Option<String>,
    pub from: PathBuf,
    pub to: Option<PathBuf>,
    pub decision: Decision,
    /// The missing cached file was found elsewhere in the source directory
    pub recovered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub moved: usize,
    pub skipped: usize,
    pub dedup: usize,
    pub recovered: usize,
    pub already_target: usize,
    pub target_wins: usize,
    pub orphans: usize,
    pub links_merged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub items: Vec<MigrationItem>,
    pub counts: MigrationCounts,
}

impl MigrationReport {
    fn push(&mut self, item: MigrationItem) {
        let orphan = item.identifier.is_none();
        match &item.decision {
            Decision::AlreadyTarget => self.counts.already_target += 1,
            Decision::Skipped(reason) => {
                self.counts.skipped += 1;
                if *reason == SkipReason::Dedup {
                    self.counts.dedup += 1;
                }
            }
            Decision::TargetWins => self.counts.target_wins += 1,
            Decision::Moved if orphan => self.counts.orphans += 1,
            Decision::Moved => self.counts.moved += 1,
            Decision::Failed(_) => self.counts.failed += 1,
        }
        if item.recovered {
            self.counts.recovered += 1;
        }

        info!(
            dry_run = self.dry_run,
            identifier = item.identifier.as_deref().unwrap_or("<orphan>"),
            from = %item.from.display(),
            to = %item.to.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            decision = item.decision.label(),
            recovered = item.recovered,
            "migration decision"
        );
        self.items.push(item);
    }
}

/// Filesystem as seen after the moves planned so far
struct FsView {
    dry_run: bool,
    created: HashMap<PathBuf, Option<u64>>,
    removed: HashSet<PathBuf>,
}

impl FsView {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            created: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        if self.created.contains_key(path) {
            return true;
        }
        !self.removed.contains(path) && path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        if self.created.contains_key(path) {
            return true;
        }
        !self.removed.contains(path) && path.is_file()
    }

    fn size(&self, path: &Path) -> Option<u64> {
        if let Some(size) = self.created.get(path) {
            return *size;
        }
        if self.removed.contains(path) {
            return None;
        }
        fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    fn move_file(&mut self, from: &Path, to: &Path) -> std::io::Result<()> {
        let size = self.size(from);
        if !self.dry_run {
            move_file(from, to)?;
        }
        self.removed.insert(from.to_path_buf());
        self.removed.remove(to);
        self.created.remove(from);
        self.created.insert(to.to_path_buf(), size);
        Ok(())
    }
}

/// Rename, falling back to copy-then-delete across filesystem boundaries
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if let Err(e) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    fs::remove_file(from)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

pub struct Migrator {
    source_dir: PathBuf,
    target_dir: PathBuf,
    dry_run: bool,
}

impl Migrator {
    /// `source_dir` and `target_dir` are the media directories of each side
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Visible regular files under the source directory, in a stable order
    fn source_files(&self, view: &FsView) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.source_dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| view.is_file(p))
            .collect();
        files.sort();
        files
    }

    fn find_by_name(&self, view: &FsView, name: &std::ffi::OsStr) -> Option<PathBuf> {
        self.source_files(view)
            .into_iter()
            .find(|p| p.file_name() == Some(name))
    }

    /// Reconcile `source` into `target`
    ///
    /// In dry-run mode both indexes are left untouched and no file is moved;
    /// the report is identical to what a real run would produce.
    pub fn run(&self, source: &mut CacheIndex, target: &mut CacheIndex) -> Result<MigrationReport> {
        let mut src = source.clone();
        let mut tgt = target.clone();
        let mut view = FsView::new(self.dry_run);
        let mut report = MigrationReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        if !self.dry_run {
            ensure_dir(&self.target_dir)?;
        }

        let identifiers: Vec<String> = src
            .entries
            .values()
            .filter(|e| !e.cached_path.is_empty())
            .map(|e| e.identifier.clone())
            .collect();

        for identifier in identifiers {
            let item = self.migrate_entry(&identifier, &mut src, &mut tgt, &mut view);
            report.push(item);
        }

        self.sweep_orphans(&src, &tgt, &mut view, &mut report);

        for (raw, id) in &src.links {
            if !tgt.links.contains_key(raw) {
                tgt.links.insert(raw.clone(), id.clone());
                report.counts.links_merged += 1;
            }
        }

        if !self.dry_run {
            *source = src;
            *target = tgt;
        }
        Ok(report)
    }

    fn migrate_entry(
        &self,
        identifier: &str,
        src: &mut CacheIndex,
        tgt: &mut CacheIndex,
        view: &mut FsView,
    ) -> MigrationItem {
        let Some(entry) = src.get(identifier).cloned() else {
            return MigrationItem {
                identifier: Some(identifier.to_string()),
                from: PathBuf::new(),
                to: None,
                decision: Decision::Skipped(SkipReason::NotFound),
                recovered: false,
            };
        };
        let mut from = PathBuf::from(&entry.cached_path);
        let mut item = MigrationItem {
            identifier: Some(identifier.to_string()),
            from: from.clone(),
            to: None,
            decision: Decision::AlreadyTarget,
            recovered: false,
        };

        if is_within(&from, &self.target_dir) {
            return item;
        }

        if !view.is_file(&from) {
            let found = from
                .file_name()
                .and_then(|name| self.find_by_name(view, name));
            match found {
                Some(found) => {
                    if let Some(e) = src.entries.get_mut(identifier) {
                        e.notes.push(format!(
                            "recovered {} from {}",
                            from.display(),
                            found.display()
                        ));
                        e.set_cached_path(&found);
                    }
                    item.recovered = true;
                    item.from = found.clone();
                    from = found;
                }
                None => {
                    item.decision = Decision::Skipped(SkipReason::NotFound);
                    return item;
                }
            }
        }

        let Some(name) = from.file_name() else {
            item.decision = Decision::Skipped(SkipReason::NotFound);
            return item;
        };
        let mut dest = self.target_dir.join(name);

        if view.exists(&dest) {
            if view.size(&dest) == view.size(&from) {
                let mut repointed = src.get(identifier).cloned().unwrap_or(entry);
                repointed.set_cached_path(&dest);
                match tgt.entries.get_mut(identifier) {
                    Some(existing) => existing.set_cached_path(&dest),
                    None => tgt.insert(repointed.clone()),
                }
                src.insert(repointed);
                item.to = Some(dest);
                item.decision = Decision::Skipped(SkipReason::Dedup);
                return item;
            }
            dest = dedup_path(&dest, |p| view.exists(p));
        }

        let target_live = tgt
            .get(identifier)
            .and_then(|e| e.cached_path().map(|p| view.is_file(p)))
            .unwrap_or(false);
        if target_live {
            item.decision = Decision::TargetWins;
            return item;
        }

        item.to = Some(dest.clone());
        if let Err(e) = view.move_file(&from, &dest) {
            warn!(identifier, error = %e, "move failed, entry left in place");
            item.decision = Decision::Failed(e.to_string());
            return item;
        }

        if let Some(mut moved) = src.remove(identifier) {
            moved.set_cached_path(&dest);
            moved
                .notes
                .push(format!("migrated from {}", from.display()));
            tgt.insert(moved);
        }
        item.decision = Decision::Moved;
        item
    }

    fn sweep_orphans(
        &self,
        src: &CacheIndex,
        tgt: &CacheIndex,
        view: &mut FsView,
        report: &mut MigrationReport,
    ) {
        let referenced: HashSet<PathBuf> = src
            .referenced_paths()
            .into_iter()
            .chain(tgt.referenced_paths())
            .map(|p| absolutize(Path::new("/"), &p))
            .collect();

        for file in self.source_files(view) {
            if referenced.contains(&absolutize(Path::new("/"), &file)) {
                continue;
            }
            let Some(name) = file.file_name() else {
                continue;
            };
            let dest = self.target_dir.join(name);
            let mut item = MigrationItem {
                identifier: None,
                from: file.clone(),
                to: Some(dest.clone()),
                decision: Decision::Moved,
                recovered: false,
            };

            if view.exists(&dest) {
                item.decision = Decision::Skipped(SkipReason::DestinationExists);
            } else if let Err(e) = view.move_file(&file, &dest) {
                item.decision = Decision::Failed(e.to_string());
            }
            report.push(item);
        }
    }
}
