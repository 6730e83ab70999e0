//! File system helpers for the backup folder.

pub mod metadata;
pub mod walker;
