//! Grandfather-father-son retention: which backups survive a run.

pub mod bucket;
pub mod window;

pub use bucket::{Bucket, FolderMtimes, MtimeSource, Reconciler, Reconciliation, BUCKET_SCAN_DAYS};
pub use window::{RetentionPlan, RetentionPolicy, Tier};
