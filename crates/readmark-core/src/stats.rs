//! Reading statistics
//!
//! Pure derivation over a database snapshot. Nothing here is persisted.
//!
//! Pages read for a chapter are its total page count once completed,
//! otherwise the pages up to and including the current one. Estimated time
//! multiplies pages read by an assumed reading speed.
//!
//! Snapshots taken while a write is in flight may be slightly stale; the
//! figures are for display and catch up on the next read.

use serde::Serialize;

use crate::models::ProgressDatabase;

/// Aggregate counters for a statistics panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub total_manga_read: u64,
    pub total_chapters_read: u64,
    pub total_chapters_completed: u64,
    pub total_pages_read: u64,
    pub total_estimated_minutes_read: u64,
}

impl ReadingStats {
    /// Derive statistics from a database snapshot
    pub fn from_database(db: &ProgressDatabase, seconds_per_page: u64) -> Self {
        let mut stats = ReadingStats {
            total_manga_read: db.manga.len() as u64,
            ..Self::default()
        };

        for chapter in db.manga.values().flat_map(|m| m.chapters.values()) {
            stats.total_chapters_read += 1;
            if chapter.completed {
                stats.total_chapters_completed += 1;
            }
            stats.total_pages_read += chapter.pages_read();
        }

        stats.total_estimated_minutes_read =
            stats.total_pages_read.saturating_mul(seconds_per_page) / 60;
        stats
    }

    /// Estimated reading time as "Xh Ym"
    pub fn estimated_time_human(&self) -> String {
        let hours = self.total_estimated_minutes_read / 60;
        let minutes = self.total_estimated_minutes_read % 60;
        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}m", minutes)
        }
    }
}
