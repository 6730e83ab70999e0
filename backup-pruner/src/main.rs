//! Backup Pruner - Main entry point
//!
//! Applies a grandfather-father-son retention policy to an autobackup folder
//! and rewrites its manifest. Every decision is printed to stdout.

use anyhow::Result;
use backup_pruner::{executor, utils, Config, PruneEvent, PruneOptions};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The folder containing backups to manage
    #[arg(short = 'b', long = "backupfolder", value_name = "DIR")]
    backup_folder: Option<PathBuf>,

    /// Months of weekly backups to keep (0 for infinite)
    #[arg(short = 'm', long = "monthstokeep")]
    months_to_keep: Option<u32>,

    /// Weeks of daily backups to keep (0 for infinite)
    #[arg(short = 'w', long = "weekstokeep")]
    weeks_to_keep: Option<u32>,

    /// Years of monthly backups to keep (0 for infinite)
    #[arg(short = 'y', long = "yearstokeep")]
    years_to_keep: Option<u32>,

    /// The timezone to use when processing backups
    #[arg(short, long)]
    timezone: Option<String>,

    /// Show what would be deleted without touching the folder
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        let retention = &mut config.retention;
        if let Some(folder) = &self.backup_folder {
            retention.backup_folder = folder.clone();
        }
        if let Some(months) = self.months_to_keep {
            retention.months_to_keep = months;
        }
        if let Some(weeks) = self.weeks_to_keep {
            retention.weeks_to_keep = weeks;
        }
        if let Some(years) = self.years_to_keep {
            retention.years_to_keep = years;
        }
        if let Some(tz) = &self.timezone {
            retention.timezone = tz.clone();
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

fn print_event(event: &PruneEvent<'_>, dry_run: bool) {
    match event {
        PruneEvent::OrphanDeleted(path) if dry_run => {
            println!("Would delete orphaned file: {}", path.display())
        }
        PruneEvent::OrphanDeleted(path) => println!("Deleting orphaned file: {}", path.display()),
        PruneEvent::ExpiredDeleted(path) if dry_run => {
            println!("Would delete file: {}", path.display())
        }
        PruneEvent::ExpiredDeleted(path) => println!("Deleting file: {}", path.display()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    args.apply(&mut config);

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    tracing::info!("Starting backup-pruner v{}", env!("CARGO_PKG_VERSION"));

    let options = PruneOptions::from_config(&config.retention, args.dry_run)?;
    let report = executor::run_with_callback(&options, chrono::Utc::now(), |event| {
        print_event(event, options.dry_run)
    })?;
    println!("{}", report.render_manifest()?);

    tracing::info!(
        deleted = report.total_deleted(),
        kept = report.manifest.len(),
        manifest = %report.manifest_path.display(),
        "Run complete"
    );

    Ok(())
}
