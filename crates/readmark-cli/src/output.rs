//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{DateTime, Utc};
use serde::Serialize;

use readmark_core::{MangaProgress, Notification, ReadingStats};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print one manga's progress with every chapter
    pub fn print_progress(&self, progress: &MangaProgress) {
        match self.format {
            OutputFormat::Human => {
                println!("Manga:     {}", progress.manga_id);
                if !progress.manga_title.is_empty() {
                    println!("Title:     {}", progress.manga_title);
                }
                if !progress.cover_url.is_empty() {
                    println!("Cover:     {}", progress.cover_url);
                }
                println!("Position:  {}", position(progress));
                println!("Started:   {}", format_secs(progress.first_read_at));
                println!("Last read: {}", format_secs(progress.last_read_at));

                println!();
                println!(
                    "── Chapters ({}, {} completed) ──",
                    progress.chapters.len(),
                    progress.completed_chapters()
                );
                for (chapter_id, chapter) in &progress.chapters {
                    println!(
                        "{} {} | page {}/{} | {}",
                        if chapter.completed { "✓" } else { " " },
                        truncate(chapter_id, 24),
                        chapter.current_page + 1,
                        chapter.total_pages,
                        format_millis(chapter.last_read_at)
                    );
                }
            }
            OutputFormat::Json => print_json(progress),
            OutputFormat::Quiet => {
                println!("{}", progress.manga_id);
            }
        }
    }

    /// Print the reading history
    pub fn print_progress_list(&self, all: &[MangaProgress]) {
        match self.format {
            OutputFormat::Human => {
                if all.is_empty() {
                    println!("No reading history.");
                    return;
                }
                for progress in all {
                    let title = if progress.manga_title.is_empty() {
                        "(untitled)"
                    } else {
                        progress.manga_title.as_str()
                    };
                    println!(
                        "{} | {} | {} | {}",
                        truncate(&progress.manga_id, 16),
                        truncate(title, 30),
                        position(progress),
                        format_secs(progress.last_read_at)
                    );
                }
                println!("\n{} manga", all.len());
            }
            OutputFormat::Json => print_json(&all),
            OutputFormat::Quiet => {
                for progress in all {
                    println!("{}", progress.manga_id);
                }
            }
        }
    }

    /// Print reading statistics
    pub fn print_stats(&self, stats: &ReadingStats) {
        match self.format {
            OutputFormat::Human => {
                println!("Reading:");
                println!("  Manga:              {}", stats.total_manga_read);
                println!("  Chapters:           {}", stats.total_chapters_read);
                println!("  Chapters completed: {}", stats.total_chapters_completed);
                println!("  Pages:              {}", stats.total_pages_read);
                println!("  Estimated time:     {}", stats.estimated_time_human());
            }
            OutputFormat::Json => print_json(stats),
            OutputFormat::Quiet => {
                println!("{}", stats.total_pages_read);
            }
        }
    }

    /// Print a failure notification raised by background writes
    pub fn notification(&self, notification: &Notification) {
        match self.format {
            OutputFormat::Human | OutputFormat::Quiet => {
                eprintln!("✗ {}: {}", notification.title, notification.message);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "manga_id": notification.manga_id,
                        "title": notification.title,
                        "message": notification.message,
                    })
                );
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// "Ch. 12 · p. 5/20" for the chapter read last
fn position(progress: &MangaProgress) -> String {
    let chapter = match progress.last_chapter_number {
        Some(number) => format!("Ch. {}", number),
        None if !progress.last_chapter_title.is_empty() => progress.last_chapter_title.clone(),
        None => progress.last_chapter_id.clone(),
    };
    match progress.chapter(&progress.last_chapter_id) {
        Some(current) => format!(
            "{} · p. {}/{}",
            chapter,
            current.current_page + 1,
            current.total_pages
        ),
        None => chapter,
    }
}

fn format_secs(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readmark_core::ProgressUpdate;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ワンピース第一話の続き", 6), "ワンピ...");
    }

    #[test]
    fn test_position() {
        let update = ProgressUpdate {
            chapter_number: Some(12.5),
            ..ProgressUpdate::new("m1", "c1", 4, 20)
        };
        let progress = MangaProgress::from_update(&update, Utc::now());
        assert_eq!(position(&progress), "Ch. 12.5 · p. 5/20");

        let untitled = MangaProgress::from_update(&ProgressUpdate::new("m1", "c9", 0, 3), Utc::now());
        assert_eq!(position(&untitled), "c9 · p. 1/3");
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(0), "1970-01-01 00:00");
        assert_eq!(format_millis(86_400_000), "1970-01-02 00:00");
    }
}
