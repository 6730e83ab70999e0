//! Prune executor - Orchestrates a single retention run.
//!
//! A run goes through these stages in order:
//! - Load the newest manifest, ignoring entries for files that are gone
//! - Delete orphaned backups (on disk, not in the manifest)
//! - Compute retention dates from "now" and the oldest remaining backup
//! - Reconcile dates against manifest entries into a keep set
//! - Delete every backup outside the keep set and rewrite the manifest
//!
//! Deletions are committed as they happen; a later failure does not undo them.

use crate::config::RetentionConfig;
use crate::fs::walker::{list_backups, oldest, FileInfo};
use crate::manifest::{self, Manifest};
use crate::retention::bucket::{Bucket, FolderMtimes, Reconciler};
use crate::retention::window::{self, RetentionPolicy};
use crate::utils::errors::{PrunerError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything a run needs to know
#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub backup_folder: PathBuf,
    pub policy: RetentionPolicy,
    pub timezone: Tz,
    pub backup_extension: String,
    pub manifest_suffix: String,

    /// Report decisions without deleting files or writing the manifest
    pub dry_run: bool,
}

impl PruneOptions {
    pub fn from_config(config: &RetentionConfig, dry_run: bool) -> Result<Self> {
        Ok(Self {
            backup_folder: config.backup_folder.clone(),
            policy: RetentionPolicy {
                weeks_to_keep: config.weeks_to_keep,
                months_to_keep: config.months_to_keep,
                years_to_keep: config.years_to_keep,
            },
            timezone: config.tz()?,
            backup_extension: config.backup_extension.clone(),
            manifest_suffix: config.manifest_suffix.clone(),
            dry_run,
        })
    }
}

/// Progress notifications, emitted as each change is committed
#[derive(Debug)]
pub enum PruneEvent<'a> {
    /// A backup missing from the manifest was deleted
    OrphanDeleted(&'a Path),

    /// A backup outside every retention bucket was deleted
    ExpiredDeleted(&'a Path),
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct PruneReport {
    pub manifest_path: PathBuf,
    pub orphans_deleted: Vec<PathBuf>,
    pub expired_deleted: Vec<PathBuf>,
    pub retention_dates: Vec<NaiveDate>,
    pub buckets: Vec<Bucket>,

    /// The new manifest: exactly the surviving backups
    pub manifest: Manifest,
    pub dry_run: bool,
}

impl PruneReport {
    pub fn total_deleted(&self) -> usize {
        self.orphans_deleted.len() + self.expired_deleted.len()
    }

    /// Announce the manifest write, followed by the manifest itself
    pub fn render_manifest(&self) -> Result<String> {
        let header = if self.dry_run {
            "Dry run: would write new meta.json"
        } else {
            "Writing new meta.json"
        };
        Ok(format!("{}\n{}", header, self.manifest.to_pretty_json()?))
    }
}

/// Run without progress notifications
pub fn run(options: &PruneOptions, now: DateTime<Utc>) -> Result<PruneReport> {
    run_with_callback(options, now, |_| {})
}

/// Run, calling `callback` for each deletion
pub fn run_with_callback<F>(
    options: &PruneOptions,
    now: DateTime<Utc>,
    mut callback: F,
) -> Result<PruneReport>
where
    F: FnMut(&PruneEvent<'_>),
{
    let folder = options.backup_folder.as_path();
    let tz = options.timezone;

    info!(
        folder = %folder.display(),
        weeks = options.policy.weeks_to_keep,
        months = options.policy.months_to_keep,
        years = options.policy.years_to_keep,
        timezone = %tz,
        dry_run = options.dry_run,
        "[PRUNE] Starting retention run"
    );

    let loaded = manifest::load(folder, &options.manifest_suffix)?;

    let (orphans_deleted, remaining) = collect_orphans(options, &loaded.manifest, &mut callback)?;

    let earliest = oldest(&remaining).ok_or_else(|| PrunerError::NoBackupsFound {
        folder: folder.to_path_buf(),
    })?;
    debug!(file = %earliest.file_name, "[PRUNE] Oldest remaining backup");

    let plan = window::compute(
        now.with_timezone(&tz).naive_local(),
        earliest.metadata.modified_local(tz),
        &options.policy,
    );
    if plan.is_empty() {
        warn!("[PRUNE] No retention dates; is the oldest backup dated in the future?");
    }

    let mtimes = FolderMtimes::new(folder);
    let reconciliation = Reconciler::new(&loaded.manifest, tz, &mtimes).reconcile(plan.dates())?;
    let keep = reconciliation.keep;
    if keep.is_empty() {
        warn!("[PRUNE] Keep set is empty; every remaining backup will be deleted");
    }

    let expired_deleted = prune_expired(&remaining, &keep, options.dry_run, &mut callback)?;

    if !options.dry_run {
        manifest::write(&loaded.path, &keep)?;
    }

    info!(
        orphans = orphans_deleted.len(),
        expired = expired_deleted.len(),
        kept = keep.len(),
        "[PRUNE] Completed"
    );

    Ok(PruneReport {
        manifest_path: loaded.path,
        orphans_deleted,
        expired_deleted,
        retention_dates: plan.dates().collect(),
        buckets: reconciliation.buckets,
        manifest: keep,
        dry_run: options.dry_run,
    })
}

/// Delete backups that the manifest doesn't know about.
///
/// Returns the deleted paths and the backups left on disk afterwards. The
/// folder is listed again after deleting so the remaining list reflects disk
/// state; in a dry run the orphans are only filtered out.
fn collect_orphans<F>(
    options: &PruneOptions,
    manifest: &Manifest,
    callback: &mut F,
) -> Result<(Vec<PathBuf>, Vec<FileInfo>)>
where
    F: FnMut(&PruneEvent<'_>),
{
    let folder = options.backup_folder.as_path();
    let backups = list_backups(folder, &options.backup_extension)?;

    let (tracked, orphans): (Vec<FileInfo>, Vec<FileInfo>) = backups
        .into_iter()
        .partition(|file| file.manifest_key().is_some_and(|key| manifest.contains(key)));

    let mut deleted = Vec::with_capacity(orphans.len());
    for orphan in orphans {
        info!(file = %orphan.path.display(), "[ORPHAN] Backup not in manifest, deleting");
        if !options.dry_run {
            std::fs::remove_file(&orphan.path).map_err(|e| PrunerError::fs(&orphan.path, e))?;
        }
        callback(&PruneEvent::OrphanDeleted(&orphan.path));
        deleted.push(orphan.path);
    }

    let remaining = if options.dry_run {
        tracked
    } else {
        list_backups(folder, &options.backup_extension)?
    };

    Ok((deleted, remaining))
}

/// Delete remaining backups that aren't in the keep set
fn prune_expired<F>(
    remaining: &[FileInfo],
    keep: &Manifest,
    dry_run: bool,
    callback: &mut F,
) -> Result<Vec<PathBuf>>
where
    F: FnMut(&PruneEvent<'_>),
{
    let mut deleted = Vec::new();

    let expired = remaining
        .iter()
        .filter(|f| !f.manifest_key().is_some_and(|key| keep.contains(key)));

    for file in expired {
        info!(file = %file.path.display(), "[PRUNE] Outside retention, deleting");
        if !dry_run {
            std::fs::remove_file(&file.path).map_err(|e| PrunerError::fs(&file.path, e))?;
        }
        callback(&PruneEvent::ExpiredDeleted(&file.path));
        deleted.push(file.path.clone());
    }

    Ok(deleted)
}
