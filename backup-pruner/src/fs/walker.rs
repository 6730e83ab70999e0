//! Flat listing of the backup folder.
//!
//! The backup folder is not traversed recursively: only direct children are
//! considered, mirroring a shell glob such as `*.unf`. Hidden files are
//! skipped, as a glob would.

use super::metadata::FileMetadata;
use crate::utils::errors::{PrunerError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Which files in the folder a listing should return
#[derive(Debug, Clone, Copy)]
pub enum FileMatch<'a> {
    /// `*.<ext>`
    Extension(&'a str),

    /// `*<suffix>`
    Suffix(&'a str),
}

impl FileMatch<'_> {
    fn matches(&self, file_name: &OsStr) -> bool {
        if file_name.as_encoded_bytes().starts_with(b".") {
            return false;
        }
        match self {
            FileMatch::Extension(ext) => Path::new(file_name).extension() == Some(OsStr::new(ext)),
            FileMatch::Suffix(suffix) => file_name.as_encoded_bytes().ends_with(suffix.as_bytes()),
        }
    }
}

/// A file (or dangling symlink) found directly inside the folder
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Base name, lossily decoded when it isn't valid UTF-8
    pub file_name: String,

    /// Modification time
    pub metadata: FileMetadata,

    utf8_name: bool,
}

impl FileInfo {
    /// Returns None for directories and symlinks to directories.
    ///
    /// Dangling symlinks are listed with the link's own mtime so they can be
    /// cleaned up like any other stray file.
    fn from_entry(entry: &DirEntry) -> Result<Option<Self>> {
        let name = entry.file_name();
        let path = entry.path().to_path_buf();

        // Resolve symlinks so the mtime is the target's
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => return Ok(None),
            Ok(_) => FileMetadata::from_path(&path),
            Err(_) if entry.path_is_symlink() => FileMetadata::from_link(&path),
            Err(e) => Err(e),
        }
        .map_err(|e| PrunerError::fs(&path, e))?;

        Ok(Some(Self {
            file_name: name.to_string_lossy().into_owned(),
            utf8_name: name.to_str().is_some(),
            path,
            metadata,
        }))
    }

    /// The name as it would appear in the manifest.
    ///
    /// None for names that aren't valid UTF-8; no manifest can list those.
    pub fn manifest_key(&self) -> Option<&str> {
        self.utf8_name.then_some(self.file_name.as_str())
    }
}

/// List files directly inside `folder` that match `pattern`.
///
/// The result is sorted by file name so that callers see a stable order.
pub fn list_files(folder: &Path, pattern: FileMatch<'_>) -> Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(folder).to_path_buf();
            PrunerError::fs(path, e.into())
        })?;

        if !pattern.matches(entry.file_name()) {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

/// List backup archives (`*.<extension>`) in the folder
pub fn list_backups(folder: &Path, extension: &str) -> Result<Vec<FileInfo>> {
    list_files(folder, FileMatch::Extension(extension))
}

/// The earliest-modified file among `files`, ties going to the first name
pub fn oldest(files: &[FileInfo]) -> Option<&FileInfo> {
    files
        .iter()
        .min_by(|a, b| {
            a.metadata
                .modified
                .cmp(&b.metadata.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        })
}
