//! Backup and restore command handlers

use anyhow::{bail, Result};

use readmark_core::{RestoreSource, Tracker};

use crate::output::Output;
use crate::prompt::confirm;

/// Copy the progress file over the backup
pub async fn backup(tracker: &Tracker, output: &Output) -> Result<()> {
    if tracker.backup().await? {
        output.success(&format!(
            "Backed up progress to {}",
            tracker.config().backup_path().display()
        ));
    } else {
        output.message("No progress file yet; nothing to back up.");
    }
    Ok(())
}

/// Replace the progress file with the backup
pub async fn restore(tracker: &Tracker, yes: bool, output: &Output) -> Result<()> {
    let backup_path = tracker.config().backup_path();
    if !backup_path.exists() {
        bail!("No backup found at {}", backup_path.display());
    }

    if output.should_prompt() && !yes {
        println!(
            "Replace {} with the backup?",
            tracker.config().progress_path().display()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match tracker.restore().await? {
        RestoreSource::Backup => output.success("Restored progress from backup"),
        RestoreSource::Empty => {
            output.message("No usable backup found; progress was reset to an empty history.")
        }
    }
    Ok(())
}
