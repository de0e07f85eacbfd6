//! Status command handler

use anyhow::Result;

use readmark_core::Tracker;

use crate::output::{Output, OutputFormat};

/// Show storage location, tracking mode and reading statistics
pub async fn show(tracker: &Tracker, output: &Output) -> Result<()> {
    let config = tracker.config();
    let progress_path = config.progress_path();
    // Checked first: loading for statistics creates the file
    let progress_exists = progress_path.exists();
    let backup_exists = config.backup_path().exists();
    let stats = tracker.statistics().await?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "tracking": tracker.mode().status_label(),
                    "incognito": tracker.is_incognito(),
                    "storage": {
                        "data_dir": config.data_dir,
                        "progress_file": progress_path,
                        "progress_exists": progress_exists,
                        "backup_exists": backup_exists,
                    },
                    "recovery": config.recovery.to_string(),
                    "stats": stats,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", tracker.mode().status_label());
        }
        OutputFormat::Human => {
            println!("readmark Status");
            println!("===============");
            println!();
            println!("Tracking: {}", tracker.mode().status_label());
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!(
                "  Progress: {}",
                if progress_exists {
                    "present"
                } else {
                    "not created yet"
                }
            );
            println!(
                "  Backup:   {}",
                if backup_exists { "present" } else { "none" }
            );
            println!("  Recovery: {}", config.recovery);
            println!();
            output.print_stats(&stats);
        }
    }

    Ok(())
}
