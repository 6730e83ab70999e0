//! Backup Pruner Library
//!
//! Grandfather-father-son retention for a flat folder of timestamped
//! backup archives and the JSON manifest that describes them.

pub mod config;
pub mod executor;
pub mod fs;
pub mod manifest;
pub mod retention;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{PruneEvent, PruneOptions, PruneReport};
pub use utils::errors::PrunerError;
pub type Result<T> = std::result::Result<T, PrunerError>;
