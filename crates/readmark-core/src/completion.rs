//! Chapter completion policy
//!
//! Tracks the chapter open in the reader and turns page turns, chapter
//! switches and view teardown into progress updates. A chapter is marked
//! completed only when the reader leaves it while sitting on its last page;
//! looking at the last page and staying there does not count.

use crate::models::ProgressUpdate;

/// Identity and display details of a manga being read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MangaInfo {
    pub manga_id: String,
    pub title: String,
    pub cover_url: Option<String>,
}

/// Identity and display details of a chapter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChapterInfo {
    pub chapter_id: String,
    pub number: Option<f64>,
    pub title: String,
    pub total_pages: u32,
}

impl ChapterInfo {
    pub fn new(chapter_id: impl Into<String>, total_pages: u32) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            total_pages,
            ..Self::default()
        }
    }
}

/// The chapter currently open and the last reported position in it
#[derive(Debug, Clone)]
pub struct ReadingSession {
    manga: MangaInfo,
    chapter: ChapterInfo,
    page: u32,
}

impl ReadingSession {
    /// Open a chapter at a starting page
    pub fn open(manga: MangaInfo, chapter: ChapterInfo, start_page: u32) -> Self {
        Self {
            manga,
            chapter,
            page: start_page,
        }
    }

    pub fn chapter(&self) -> &ChapterInfo {
        &self.chapter
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether the last reported page is the chapter's final page
    pub fn on_last_page(&self) -> bool {
        self.chapter.total_pages > 0 && self.page + 1 >= self.chapter.total_pages
    }

    /// Record a page turn within the current chapter
    pub fn page_changed(&mut self, page: u32) -> ProgressUpdate {
        self.page = page;
        self.update(false)
    }

    /// Move to another chapter
    ///
    /// Returns the updates to save in order: when the previous chapter was
    /// left on its last page it is marked completed first, then the new
    /// chapter is initialized at page 0. Switching to the same chapter ID is
    /// treated as a page reset, not a transition.
    pub fn switch_chapter(&mut self, next: ChapterInfo) -> Vec<ProgressUpdate> {
        if next.chapter_id == self.chapter.chapter_id {
            self.chapter = next;
            return vec![self.page_changed(0)];
        }

        let mut updates = Vec::with_capacity(2);
        if self.on_last_page() {
            updates.push(self.update(true));
        }

        self.chapter = next;
        self.page = 0;
        updates.push(self.update(false));
        updates
    }

    /// The reader view is closing without a chapter change
    ///
    /// Persists the raw position only; no completion judgement is made.
    pub fn close(self) -> ProgressUpdate {
        self.update(false)
    }

    fn update(&self, mark_complete: bool) -> ProgressUpdate {
        ProgressUpdate {
            manga_id: self.manga.manga_id.clone(),
            chapter_id: self.chapter.chapter_id.clone(),
            chapter_number: self.chapter.number,
            chapter_title: self.chapter.title.clone(),
            manga_title: self.manga.title.clone(),
            cover_url: self.manga.cover_url.clone(),
            current_page: self.page,
            total_pages: self.chapter.total_pages,
            mark_complete,
        }
    }
}
