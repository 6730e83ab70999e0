//! Bucket reconciliation: pick one surviving backup per retention date.
//!
//! For each date, a window starting at its midnight grows one day at a time
//! until it contains at least one backup (by manifest `time`), up to
//! [`BUCKET_SCAN_DAYS`]. If several backups share that window, only the one
//! with the oldest file modification time survives.

use crate::fs::metadata::FileMetadata;
use crate::manifest::Manifest;
use crate::utils::errors::{PrunerError, Result};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

/// Longest window, in days, searched for a retention date
pub const BUCKET_SCAN_DAYS: u32 = 30;

/// Source of file modification times for breaking ties within a bucket
pub trait MtimeSource {
    fn modified(&self, file_name: &str) -> Result<SystemTime>;
}

/// Reads modification times from files in the backup folder
#[derive(Debug, Clone, Copy)]
pub struct FolderMtimes<'a> {
    folder: &'a Path,
}

impl<'a> FolderMtimes<'a> {
    pub fn new(folder: &'a Path) -> Self {
        Self { folder }
    }
}

impl MtimeSource for FolderMtimes<'_> {
    fn modified(&self, file_name: &str) -> Result<SystemTime> {
        let path = self.folder.join(file_name);
        FileMetadata::from_path(&path)
            .map(|m| m.modified)
            .map_err(|e| PrunerError::fs(path, e))
    }
}

impl MtimeSource for HashMap<String, SystemTime> {
    fn modified(&self, file_name: &str) -> Result<SystemTime> {
        self.get(file_name).copied().ok_or_else(|| {
            PrunerError::fs(
                file_name,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no modification time"),
            )
        })
    }
}

/// The outcome for one retention date that found backups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub date: NaiveDate,

    /// Window length in days at which backups were first found
    pub window_days: u32,

    pub kept: String,

    /// Other backups in the same window, not kept on account of this date
    pub discarded: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// The entries that survive, keyed by file name
    pub keep: Manifest,

    /// One bucket per retention date that found a backup, in date order
    pub buckets: Vec<Bucket>,
}

/// Reconciles retention dates against manifest entries
pub struct Reconciler<'a, M: MtimeSource> {
    manifest: &'a Manifest,
    entries: Vec<(&'a str, NaiveDateTime)>,
    mtimes: &'a M,
    scan_days: u32,
}

impl<'a, M: MtimeSource> Reconciler<'a, M> {
    pub fn new(manifest: &'a Manifest, tz: Tz, mtimes: &'a M) -> Self {
        let entries = manifest
            .iter()
            .filter_map(|(name, entry)| match entry.local_time(tz) {
                Some(local) => Some((name.as_str(), local)),
                None => {
                    tracing::warn!(file = %name, time = entry.time, "[BUCKET] Backup time out of range, ignoring");
                    None
                }
            })
            .collect();

        Self {
            manifest,
            entries,
            mtimes,
            scan_days: BUCKET_SCAN_DAYS,
        }
    }

    /// Override the longest window searched
    pub fn with_scan_days(mut self, scan_days: u32) -> Self {
        self.scan_days = scan_days;
        self
    }

    /// Entries whose backup time falls in the first non-empty window for `date`
    fn window_for(&self, date: NaiveDate) -> Option<(u32, Vec<&'a str>)> {
        let start = date.and_time(NaiveTime::MIN);

        for days in 1..=self.scan_days {
            let end = start.checked_add_days(Days::new(u64::from(days)))?;
            let found: Vec<&str> = self
                .entries
                .iter()
                .filter(|(_, time)| *time >= start && *time < end)
                .map(|(name, _)| *name)
                .collect();
            if !found.is_empty() {
                return Some((days, found));
            }
        }

        None
    }

    /// The survivor among several candidates: oldest mtime, then smallest name
    fn earliest_modified(&self, first: &'a str, rest: &[&'a str]) -> Result<&'a str> {
        let mut best = (self.mtimes.modified(first)?, first);
        for name in rest {
            let candidate = (self.mtimes.modified(name)?, *name);
            if candidate < best {
                best = candidate;
            }
        }
        Ok(best.1)
    }

    /// Decide the bucket for a single retention date
    pub fn bucket(&self, date: NaiveDate) -> Result<Option<Bucket>> {
        let Some((window_days, found)) = self.window_for(date) else {
            tracing::debug!(%date, "[BUCKET] No backups within scan window");
            return Ok(None);
        };

        let kept = match found.split_first() {
            Some((only, [])) => *only,
            Some((first, rest)) => self.earliest_modified(*first, rest)?,
            None => return Ok(None),
        };

        let discarded = found
            .iter()
            .filter(|name| **name != kept)
            .map(|name| name.to_string())
            .collect();

        Ok(Some(Bucket {
            date,
            window_days,
            kept: kept.to_string(),
            discarded,
        }))
    }

    /// Build the keep set for all `dates`
    pub fn reconcile(&self, dates: impl IntoIterator<Item = NaiveDate>) -> Result<Reconciliation> {
        let mut result = Reconciliation::default();

        for date in dates {
            let Some(bucket) = self.bucket(date)? else {
                continue;
            };

            tracing::debug!(
                %date,
                window_days = bucket.window_days,
                kept = %bucket.kept,
                discarded = bucket.discarded.len(),
                "[BUCKET] Selected survivor"
            );

            if let Some(entry) = self.manifest.get(&bucket.kept) {
                result.keep.insert(bucket.kept.clone(), entry.clone());
            }
            result.buckets.push(bucket);
        }

        tracing::info!(
            dates = result.buckets.len(),
            kept = result.keep.len(),
            "[BUCKET] Reconciliation complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use chrono::TimeZone;
    use std::time::Duration;

    const TZ: Tz = chrono_tz::Europe::London;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Epoch millis of a London wall-clock time
    fn millis(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        TZ.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn manifest(entries: &[(&str, i64)]) -> Manifest {
        let mut manifest = Manifest::default();
        for (name, time) in entries {
            manifest.insert(*name, ManifestEntry::new(*time));
        }
        manifest
    }

    fn mtimes(entries: &[(&str, u64)]) -> HashMap<String, SystemTime> {
        entries
            .iter()
            .map(|(name, secs)| {
                (
                    name.to_string(),
                    SystemTime::UNIX_EPOCH + Duration::from_secs(*secs),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_match_is_kept() -> Result<()> {
        let manifest = manifest(&[("a.unf", millis(2024, 3, 10, 1, 0))]);
        let mtimes = mtimes(&[]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        let bucket = reconciler.bucket(date(2024, 3, 10))?.unwrap();
        assert_eq!(bucket.kept, "a.unf");
        assert_eq!(bucket.window_days, 1);
        assert!(bucket.discarded.is_empty());
        Ok(())
    }

    #[test]
    fn test_window_grows_until_match() -> Result<()> {
        let manifest = manifest(&[
            ("later.unf", millis(2024, 3, 14, 23, 0)),
            ("much_later.unf", millis(2024, 3, 20, 1, 0)),
        ]);
        let mtimes = mtimes(&[]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        let bucket = reconciler.bucket(date(2024, 3, 10))?.unwrap();
        assert_eq!(bucket.kept, "later.unf");
        assert_eq!(bucket.window_days, 5);
        Ok(())
    }

    #[test]
    fn test_window_start_is_inclusive() -> Result<()> {
        let manifest = manifest(&[
            ("midnight.unf", millis(2024, 3, 10, 0, 0)),
            ("before.unf", millis(2024, 3, 9, 23, 59)),
        ]);
        let mtimes = mtimes(&[]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        let bucket = reconciler.bucket(date(2024, 3, 10))?.unwrap();
        assert_eq!(bucket.kept, "midnight.unf");
        Ok(())
    }

    #[test]
    fn test_nothing_within_scan_window() -> Result<()> {
        let manifest = manifest(&[("far.unf", millis(2024, 5, 1, 1, 0))]);
        let mtimes = mtimes(&[]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        assert!(reconciler.bucket(date(2024, 3, 1))?.is_none());
        Ok(())
    }

    #[test]
    fn test_earliest_mtime_survives_bucket() -> Result<()> {
        let manifest = manifest(&[
            ("first.unf", millis(2024, 3, 10, 1, 0)),
            ("second.unf", millis(2024, 3, 10, 2, 0)),
            ("third.unf", millis(2024, 3, 10, 3, 0)),
        ]);
        // Modification order differs from manifest time order
        let mtimes = mtimes(&[("first.unf", 300), ("second.unf", 100), ("third.unf", 200)]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        let bucket = reconciler.bucket(date(2024, 3, 10))?.unwrap();
        assert_eq!(bucket.kept, "second.unf");
        assert_eq!(bucket.discarded, vec!["first.unf", "third.unf"]);
        Ok(())
    }

    #[test]
    fn test_equal_mtimes_fall_back_to_name() -> Result<()> {
        let manifest = manifest(&[
            ("b.unf", millis(2024, 3, 10, 1, 0)),
            ("a.unf", millis(2024, 3, 10, 2, 0)),
        ]);
        let mtimes = mtimes(&[("a.unf", 100), ("b.unf", 100)]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        assert_eq!(reconciler.bucket(date(2024, 3, 10))?.unwrap().kept, "a.unf");
        Ok(())
    }

    #[test]
    fn test_missing_mtime_is_fatal() {
        let manifest = manifest(&[
            ("a.unf", millis(2024, 3, 10, 1, 0)),
            ("b.unf", millis(2024, 3, 10, 2, 0)),
        ]);
        let mtimes = mtimes(&[("a.unf", 100)]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        assert!(matches!(
            reconciler.bucket(date(2024, 3, 10)),
            Err(PrunerError::FileSystem { .. })
        ));
    }

    #[test]
    fn test_reconcile_unions_buckets() -> Result<()> {
        let manifest = manifest(&[
            ("mar01.unf", millis(2024, 3, 1, 1, 0)),
            ("mar02.unf", millis(2024, 3, 2, 1, 0)),
            ("mar09.unf", millis(2024, 3, 9, 1, 0)),
        ]);
        let mtimes = mtimes(&[]);
        let reconciler = Reconciler::new(&manifest, TZ, &mtimes);

        // Feb 28 and Mar 1 both land on mar01.unf; Mar 3 finds nothing until Mar 9
        let result = reconciler.reconcile([date(2024, 2, 28), date(2024, 3, 1), date(2024, 3, 3)])?;
        assert_eq!(result.buckets.len(), 3);
        let kept: Vec<_> = result.keep.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(kept, vec!["mar01.unf", "mar09.unf"]);
        Ok(())
    }

    #[test]
    fn test_larger_scan_limit_keeps_found_survivors() -> Result<()> {
        let manifest = manifest(&[
            ("a.unf", millis(2024, 1, 5, 1, 0)),
            ("b.unf", millis(2024, 1, 5, 2, 0)),
            ("c.unf", millis(2024, 2, 20, 1, 0)),
        ]);
        let mtimes = mtimes(&[("a.unf", 20), ("b.unf", 10), ("c.unf", 30)]);
        let dates = [date(2024, 1, 1), date(2024, 1, 15)];

        let narrow = Reconciler::new(&manifest, TZ, &mtimes).reconcile(dates)?;
        let wide = Reconciler::new(&manifest, TZ, &mtimes)
            .with_scan_days(90)
            .reconcile(dates)?;

        for (name, _) in narrow.keep.iter() {
            assert!(wide.keep.contains(name), "{} lost with a wider scan", name);
        }
        assert!(!narrow.keep.contains("c.unf"));
        assert!(wide.keep.contains("c.unf"));
        Ok(())
    }

    #[test]
    fn test_extra_fields_carried_into_keep_set() -> Result<()> {
        let mut manifest = Manifest::default();
        let mut entry = ManifestEntry::new(millis(2024, 3, 10, 1, 0));
        entry
            .extra
            .insert("version".to_string(), serde_json::json!("8.0.7"));
        manifest.insert("a.unf", entry.clone());
        let mtimes = mtimes(&[]);

        let result = Reconciler::new(&manifest, TZ, &mtimes).reconcile([date(2024, 3, 10)])?;
        assert_eq!(result.keep.get("a.unf"), Some(&entry));
        Ok(())
    }
}
