//! Utility modules for the backup pruner.

pub mod errors;
pub mod logger;

pub use errors::{PrunerError, Result};
