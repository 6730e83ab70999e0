//! Configuration management for the backup pruner.
//!
//! Loads configuration from a TOML file; command-line flags override
//! individual fields after loading.

use crate::utils::errors::{PrunerError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Folder containing the backup archives and manifest
    #[serde(default = "default_backup_folder")]
    pub backup_folder: PathBuf,

    /// Months of weekly backups to keep (0 = unbounded)
    #[serde(default = "default_months_to_keep")]
    pub months_to_keep: u32,

    /// Weeks of daily backups to keep (0 = unbounded)
    #[serde(default = "default_weeks_to_keep")]
    pub weeks_to_keep: u32,

    /// Years of monthly backups to keep (0 = unbounded)
    #[serde(default)]
    pub years_to_keep: u32,

    /// IANA timezone used for "now" and midnight calculations
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Extension of backup archives, without the dot
    #[serde(default = "default_backup_extension")]
    pub backup_extension: String,

    /// Filename suffix identifying manifest files
    #[serde(default = "default_manifest_suffix")]
    pub manifest_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_backup_folder() -> PathBuf {
    PathBuf::from("/var/lib/unifi/backup/autobackup")
}

fn default_months_to_keep() -> u32 {
    1
}

fn default_weeks_to_keep() -> u32 {
    1
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_backup_extension() -> String {
    "unf".to_string()
}

fn default_manifest_suffix() -> String {
    "meta.json".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            backup_folder: default_backup_folder(),
            months_to_keep: default_months_to_keep(),
            weeks_to_keep: default_weeks_to_keep(),
            years_to_keep: 0,
            timezone: default_timezone(),
            backup_extension: default_backup_extension(),
            manifest_suffix: default_manifest_suffix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PrunerError::fs(path, e))?;
        toml::from_str(&content)
            .map_err(|e| PrunerError::Config(format!("{}: {}", path.display(), e)))
    }
}

impl RetentionConfig {
    /// Resolve the configured timezone name
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| PrunerError::InvalidTimezone(self.timezone.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(
            config.retention.backup_folder,
            PathBuf::from("/var/lib/unifi/backup/autobackup")
        );
        assert_eq!(config.retention.months_to_keep, 1);
        assert_eq!(config.retention.weeks_to_keep, 1);
        assert_eq!(config.retention.years_to_keep, 0);
        assert_eq!(config.retention.tz().unwrap(), chrono_tz::Europe::London);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() -> Result<()> {
        let mut file = NamedTempFile::new().map_err(|e| PrunerError::fs("tmp", e))?;
        writeln!(
            file,
            "[retention]\nbackup_folder = \"/srv/backups\"\nyears_to_keep = 3\n"
        )
        .map_err(|e| PrunerError::fs("tmp", e))?;

        let config = Config::from_file(file.path())?;
        assert_eq!(config.retention.backup_folder, PathBuf::from("/srv/backups"));
        assert_eq!(config.retention.years_to_keep, 3);
        assert_eq!(config.retention.months_to_keep, 1);
        assert_eq!(config.retention.manifest_suffix, "meta.json");
        assert_eq!(config.log.level, "warn");
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[retention]\nweeks_to_keep = \"many\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PrunerError::Config(_)));
    }

    #[test]
    fn test_unknown_timezone() {
        let retention = RetentionConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..RetentionConfig::default()
        };
        assert!(matches!(
            retention.tz(),
            Err(PrunerError::InvalidTimezone(name)) if name == "Mars/Olympus_Mons"
        ));
    }
}
