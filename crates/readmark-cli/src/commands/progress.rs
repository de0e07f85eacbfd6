//! Reading history command handlers

use anyhow::{anyhow, Result};

use readmark_core::{DeleteOutcome, Tracker};

use crate::output::Output;
use crate::prompt::confirm;

/// List every manga with progress, most recently read first
pub async fn list(tracker: &Tracker, output: &Output) -> Result<()> {
    let all = tracker.load_all_progress().await?;
    output.print_progress_list(&all);
    Ok(())
}

/// Show one manga's progress
pub async fn show(tracker: &Tracker, manga_id: String, output: &Output) -> Result<()> {
    let progress = tracker
        .load_progress(&manga_id)
        .await?
        .ok_or_else(|| anyhow!("No progress recorded for: {}", manga_id))?;
    output.print_progress(&progress);
    Ok(())
}

/// Remove a manga from the reading history
pub async fn delete(
    tracker: &Tracker,
    manga_id: String,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let Some(progress) = tracker.load_progress(&manga_id).await? else {
        output.message(&format!("No progress recorded for: {}", manga_id));
        return Ok(());
    };

    if output.should_prompt() && !yes {
        let title = if progress.manga_title.is_empty() {
            manga_id.as_str()
        } else {
            progress.manga_title.as_str()
        };
        println!(
            "Delete reading progress for: {} ({} chapters)",
            title,
            progress.chapters.len()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match tracker.delete_progress(&manga_id).await? {
        DeleteOutcome::Deleted { .. } => {
            output.success(&format!("Deleted progress for: {}", manga_id));
        }
        DeleteOutcome::Suppressed => {
            output.message("Incognito mode is on; nothing was deleted.");
        }
    }

    Ok(())
}
