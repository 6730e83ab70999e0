//! Autobackup manifest handling.
//!
//! The manifest (`autobackup_meta.json` on a UniFi controller) is a JSON
//! object mapping each backup file name to a record with at least an
//! epoch-millisecond `time` field. Any other fields in a record are carried
//! through untouched.

use crate::fs::walker::{list_files, FileMatch, FileInfo};
use crate::utils::errors::{PrunerError, Result};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata for a single backup file in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Logical backup time, milliseconds since the Unix epoch
    pub time: i64,

    /// Fields the pruner doesn't interpret (version, datetime, size, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ManifestEntry {
    pub fn new(time: i64) -> Self {
        Self {
            time,
            extra: serde_json::Map::new(),
        }
    }

    /// The backup time as wall-clock time in `tz`, or None if out of range
    pub fn local_time(&self, tz: Tz) -> Option<NaiveDateTime> {
        DateTime::from_timestamp_millis(self.time).map(|t| t.with_timezone(&tz).naive_local())
    }
}

/// File name -> entry. Serialized as a bare JSON object, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.entries.get(file_name)
    }

    pub fn insert(&mut self, file_name: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(file_name.into(), entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    /// Drop entries whose file no longer exists in `folder`.
    ///
    /// Returns the names that were dropped.
    pub fn retain_present(&mut self, folder: &Path) -> Vec<String> {
        let mut dropped = Vec::new();
        self.entries.retain(|name, _| {
            let present = folder.join(name).is_file();
            if !present {
                dropped.push(name.clone());
            }
            present
        });
        dropped
    }

    /// Pretty JSON with 4-space indentation, non-ASCII kept verbatim
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever emits valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// A manifest together with the file it was read from
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// Find the most recently modified manifest in `folder`.
///
/// Equal mtimes go to the greatest file name.
pub fn find_latest(folder: &Path, suffix: &str) -> Result<FileInfo> {
    list_files(folder, FileMatch::Suffix(suffix))?
        .into_iter()
        .max_by(|a, b| {
            a.metadata
                .modified
                .cmp(&b.metadata.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        })
        .ok_or_else(|| PrunerError::ManifestMissing {
            folder: folder.to_path_buf(),
        })
}

/// Parse a manifest file
pub fn read(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| PrunerError::fs(path, e))?;
    serde_json::from_str(&content).map_err(|source| PrunerError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the newest manifest in `folder`, dropping entries for missing files.
pub fn load(folder: &Path, suffix: &str) -> Result<LoadedManifest> {
    let latest = find_latest(folder, suffix)?;
    let mut manifest = read(&latest.path)?;

    let dropped = manifest.retain_present(folder);
    for name in &dropped {
        tracing::debug!(file = %name, "[MANIFEST] Entry refers to missing file, ignoring");
    }

    tracing::info!(
        path = %latest.path.display(),
        entries = manifest.len(),
        dropped = dropped.len(),
        "[MANIFEST] Loaded"
    );

    Ok(LoadedManifest {
        path: latest.path,
        manifest,
    })
}

/// Overwrite `path` with the pretty-printed manifest
pub fn write(path: &Path, manifest: &Manifest) -> Result<()> {
    let json = manifest.to_pretty_json()?;
    std::fs::write(path, json).map_err(|e| PrunerError::fs(path, e))?;
    tracing::info!(path = %path.display(), entries = manifest.len(), "[MANIFEST] Written");
    Ok(())
}
