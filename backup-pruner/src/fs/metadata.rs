//! File modification times, as used for tie-breaks and the earliest-backup bound.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// The subset of file metadata the pruner cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Last modified time
    pub modified: SystemTime,
}

impl FileMetadata {
    /// Extract metadata from a file path, following symlinks
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            modified: fs::metadata(path)?.modified()?,
        })
    }

    /// Metadata of a symlink itself, without following it
    pub fn from_link(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            modified: fs::symlink_metadata(path)?.modified()?,
        })
    }

    /// Modification time as wall-clock time in `tz`
    pub fn modified_local(&self, tz: Tz) -> NaiveDateTime {
        system_time_to_local(self.modified, tz)
    }
}

/// Convert a `SystemTime` to wall-clock time in `tz`
pub fn system_time_to_local(time: SystemTime, tz: Tz) -> NaiveDateTime {
    DateTime::<Utc>::from(time).with_timezone(&tz).naive_local()
}
