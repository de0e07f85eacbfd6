//! Data models for readmark
//!
//! Defines the persisted progress aggregate and the update the reader
//! surface submits. Field names serialize in camelCase to match the on-disk
//! JSON document; manga-level timestamps are unix seconds, chapter-level
//! timestamps are unix milliseconds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk format version
pub const DATABASE_VERSION: u32 = 1;

/// Root aggregate: everything that is persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDatabase {
    pub version: u32,
    /// Unix seconds
    pub last_updated: i64,
    pub manga: BTreeMap<String, MangaProgress>,
}

impl ProgressDatabase {
    /// Create an empty database stamped with the given time
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: DATABASE_VERSION,
            last_updated: now.timestamp(),
            manga: BTreeMap::new(),
        }
    }

    /// Merge entries by manga ID, replacing whole records
    ///
    /// Returns `true` if anything changed. `last_updated` is only bumped
    /// when the contents actually differ.
    pub fn merge(&mut self, entries: Vec<MangaProgress>, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for entry in entries {
            if self.manga.get(&entry.manga_id) != Some(&entry) {
                self.manga.insert(entry.manga_id.clone(), entry);
                changed = true;
            }
        }
        if changed {
            self.last_updated = now.timestamp();
        }
        changed
    }

    /// Remove a manga record, returning it if present
    pub fn remove(&mut self, manga_id: &str, now: DateTime<Utc>) -> Option<MangaProgress> {
        let removed = self.manga.remove(manga_id);
        if removed.is_some() {
            self.last_updated = now.timestamp();
        }
        removed
    }
}

/// Reading progress for one manga
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MangaProgress {
    pub manga_id: String,
    pub manga_title: String,
    pub cover_url: String,
    pub last_chapter_id: String,
    pub last_chapter_number: Option<f64>,
    pub last_chapter_title: String,
    /// Unix seconds
    pub first_read_at: i64,
    /// Unix seconds
    pub last_read_at: i64,
    pub chapters: BTreeMap<String, ChapterProgress>,
}

impl MangaProgress {
    /// Create the record for a manga on its first progress event
    pub fn from_update(update: &ProgressUpdate, now: DateTime<Utc>) -> Self {
        let mut progress = Self {
            manga_id: update.manga_id.clone(),
            manga_title: update.manga_title.clone(),
            cover_url: update.cover_url.clone().unwrap_or_default(),
            last_chapter_id: String::new(),
            last_chapter_number: None,
            last_chapter_title: String::new(),
            first_read_at: now.timestamp(),
            last_read_at: now.timestamp(),
            chapters: BTreeMap::new(),
        };
        progress.apply(update, now);
        progress
    }

    /// Merge an update into this record, preserving other chapters
    ///
    /// Completion is monotonic: `completed = new OR existing`.
    pub fn apply(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) {
        if !update.manga_title.is_empty() {
            self.manga_title = update.manga_title.clone();
        }
        if let Some(ref cover) = update.cover_url {
            self.cover_url = cover.clone();
        }
        self.last_chapter_id = update.chapter_id.clone();
        self.last_chapter_number = update.chapter_number;
        self.last_chapter_title = update.chapter_title.clone();
        self.last_read_at = now.timestamp();

        let page = update.clamped_page();
        let read_at = now.timestamp_millis();
        self.chapters
            .entry(update.chapter_id.clone())
            .and_modify(|chapter| {
                chapter.current_page = page;
                chapter.total_pages = update.total_pages;
                chapter.last_read_at = read_at;
                chapter.completed = chapter.completed || update.mark_complete;
            })
            .or_insert(ChapterProgress {
                current_page: page,
                total_pages: update.total_pages,
                last_read_at: read_at,
                completed: update.mark_complete,
            });
    }

    /// Progress for a single chapter
    pub fn chapter(&self, chapter_id: &str) -> Option<&ChapterProgress> {
        self.chapters.get(chapter_id)
    }

    /// Number of chapters marked completed
    pub fn completed_chapters(&self) -> usize {
        self.chapters.values().filter(|c| c.completed).count()
    }
}

/// Position within one chapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub current_page: u32,
    pub total_pages: u32,
    /// Unix milliseconds
    pub last_read_at: i64,
    pub completed: bool,
}

impl ChapterProgress {
    /// Whether the position is the final page
    pub fn is_on_last_page(&self) -> bool {
        self.total_pages > 0 && self.current_page + 1 >= self.total_pages
    }

    /// Pages counted as read for statistics
    pub fn pages_read(&self) -> u64 {
        if self.completed {
            u64::from(self.total_pages)
        } else {
            u64::from(self.current_page) + 1
        }
    }
}

/// A progress event reported by the reader surface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub manga_id: String,
    pub chapter_id: String,
    pub chapter_number: Option<f64>,
    pub chapter_title: String,
    pub manga_title: String,
    pub cover_url: Option<String>,
    pub current_page: u32,
    pub total_pages: u32,
    pub mark_complete: bool,
}

impl ProgressUpdate {
    /// Create an update for a page position
    pub fn new(
        manga_id: impl Into<String>,
        chapter_id: impl Into<String>,
        current_page: u32,
        total_pages: u32,
    ) -> Self {
        Self {
            manga_id: manga_id.into(),
            chapter_id: chapter_id.into(),
            current_page,
            total_pages,
            ..Self::default()
        }
    }

    /// Check the update is structurally usable
    pub fn validate(&self) -> Result<(), String> {
        if self.manga_id.is_empty() {
            return Err("manga ID is empty".to_string());
        }
        if self.chapter_id.is_empty() {
            return Err("chapter ID is empty".to_string());
        }
        if self.total_pages == 0 {
            return Err(format!(
                "chapter '{}' has no pages (totalPages must be > 0)",
                self.chapter_id
            ));
        }
        Ok(())
    }

    /// Current page, limited to the last valid page index
    pub fn clamped_page(&self) -> u32 {
        self.current_page.min(self.total_pages.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn update(chapter: &str, page: u32, total: u32) -> ProgressUpdate {
        ProgressUpdate {
            manga_title: "Blame!".to_string(),
            chapter_title: format!("Chapter {}", chapter),
            ..ProgressUpdate::new("m1", chapter, page, total)
        }
    }

    #[test]
    fn test_from_update_creates_chapter() {
        let progress = MangaProgress::from_update(&update("c1", 4, 10), at(1_700_000_000));

        assert_eq!(progress.manga_id, "m1");
        assert_eq!(progress.last_chapter_id, "c1");
        assert_eq!(progress.first_read_at, 1_700_000_000);
        assert_eq!(progress.cover_url, "");

        let chapter = progress.chapter("c1").unwrap();
        assert_eq!(chapter.current_page, 4);
        assert_eq!(chapter.total_pages, 10);
        assert_eq!(chapter.last_read_at, 1_700_000_000_000);
        assert!(!chapter.completed);
    }

    #[test]
    fn test_apply_preserves_other_chapters() {
        let mut progress = MangaProgress::from_update(&update("c1", 4, 10), at(100));
        progress.apply(&update("c2", 0, 20), at(200));

        assert_eq!(progress.chapters.len(), 2);
        assert_eq!(progress.chapter("c1").unwrap().current_page, 4);
        assert_eq!(progress.last_chapter_id, "c2");
        assert_eq!(progress.first_read_at, 100);
        assert_eq!(progress.last_read_at, 200);
    }

    #[test]
    fn test_completion_is_monotonic() {
        let mut progress = MangaProgress::from_update(&update("c1", 9, 10), at(100));
        let mut done = update("c1", 9, 10);
        done.mark_complete = true;
        progress.apply(&done, at(110));
        assert!(progress.chapter("c1").unwrap().completed);

        // Re-entering the chapter partway through never clears the flag
        progress.apply(&update("c1", 2, 10), at(120));
        let chapter = progress.chapter("c1").unwrap();
        assert!(chapter.completed);
        assert_eq!(chapter.current_page, 2);
    }

    #[test]
    fn test_page_is_clamped() {
        let progress = MangaProgress::from_update(&update("c1", 15, 10), at(100));
        assert_eq!(progress.chapter("c1").unwrap().current_page, 9);
    }

    #[test]
    fn test_cover_kept_when_update_has_none() {
        let mut first = update("c1", 0, 10);
        first.cover_url = Some("https://covers.example/m1.jpg".to_string());
        let mut progress = MangaProgress::from_update(&first, at(100));

        progress.apply(&update("c1", 1, 10), at(101));
        assert_eq!(progress.cover_url, "https://covers.example/m1.jpg");
    }

    #[test]
    fn test_validate() {
        assert!(update("c1", 0, 10).validate().is_ok());
        assert!(update("c1", 0, 0).validate().is_err());
        assert!(update("", 0, 10).validate().is_err());
        assert!(ProgressUpdate::new("", "c1", 0, 10).validate().is_err());
    }

    #[test]
    fn test_merge_skips_identical_entries() {
        let mut db = ProgressDatabase::empty(at(100));
        let entry = MangaProgress::from_update(&update("c1", 4, 10), at(100));

        assert!(db.merge(vec![entry.clone()], at(200)));
        assert_eq!(db.last_updated, 200);

        assert!(!db.merge(vec![entry], at(300)));
        assert_eq!(db.last_updated, 200);
    }

    #[test]
    fn test_pages_read() {
        let partial = ChapterProgress {
            current_page: 4,
            total_pages: 10,
            last_read_at: 0,
            completed: false,
        };
        assert_eq!(partial.pages_read(), 5);
        assert!(!partial.is_on_last_page());

        let done = ChapterProgress {
            current_page: 2,
            completed: true,
            ..partial
        };
        assert_eq!(done.pages_read(), 10);
    }

    #[test]
    fn test_json_shape() {
        let mut db = ProgressDatabase::empty(at(100));
        db.merge(
            vec![MangaProgress::from_update(&update("c1", 4, 10), at(100))],
            at(100),
        );

        let value = serde_json::to_value(&db).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["lastUpdated"], 100);
        let manga = &value["manga"]["m1"];
        assert_eq!(manga["mangaId"], "m1");
        assert!(manga["lastChapterNumber"].is_null());
        assert_eq!(manga["chapters"]["c1"]["currentPage"], 4);
        assert_eq!(manga["chapters"]["c1"]["lastReadAt"], 100_000);
        assert_eq!(manga["chapters"]["c1"]["completed"], false);
    }
}
