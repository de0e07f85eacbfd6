//! Read command handler
//!
//! Plays the reader view: opens a chapter, turns pages one by one, optionally
//! moves on to the next chapter, then closes. Every step goes through the
//! same session and tracker a graphical reader would use, so rapid page turns
//! are coalesced and completion is judged on chapter change.

use anyhow::{bail, Result};
use clap::Args;

use readmark_core::{ChapterInfo, MangaInfo, ReadingSession, SaveOutcome, TrackingMode, Tracker};

use crate::output::Output;

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Manga ID
    pub manga_id: String,
    /// Chapter ID to open
    pub chapter_id: String,
    /// Number of pages in the chapter
    #[arg(long)]
    pub pages: u32,
    /// Page to open at (0-based)
    #[arg(long, default_value_t = 0)]
    pub from: u32,
    /// Last page turned to (0-based, defaults to --from)
    #[arg(long)]
    pub to: Option<u32>,
    /// Manga title
    #[arg(short = 'T', long)]
    pub title: Option<String>,
    /// Cover image URL
    #[arg(long)]
    pub cover: Option<String>,
    /// Chapter number (e.g. 12 or 12.5)
    #[arg(long)]
    pub number: Option<f64>,
    /// Chapter title
    #[arg(long)]
    pub chapter_title: Option<String>,
    /// Move on to this chapter after the last page turn
    #[arg(long, requires = "next_pages")]
    pub next: Option<String>,
    /// Number of pages in the next chapter
    #[arg(long, requires = "next")]
    pub next_pages: Option<u32>,
    /// Read without recording anything
    #[arg(long)]
    pub incognito: bool,
}

impl ReadArgs {
    /// Pages turned to, in order
    fn page_turns(&self) -> Result<Vec<u32>> {
        if self.pages == 0 {
            bail!("--pages must be at least 1");
        }
        if self.next_pages == Some(0) {
            bail!("--next-pages must be at least 1");
        }
        let to = self.to.unwrap_or(self.from);
        if self.from >= self.pages || to >= self.pages {
            bail!(
                "Pages are numbered 0 to {} for a {}-page chapter",
                self.pages - 1,
                self.pages
            );
        }
        if to < self.from {
            Ok((to..=self.from).rev().collect())
        } else {
            Ok((self.from..=to).collect())
        }
    }

    fn session(&self) -> ReadingSession {
        let manga = MangaInfo {
            manga_id: self.manga_id.clone(),
            title: self.title.clone().unwrap_or_default(),
            cover_url: self.cover.clone(),
        };
        let chapter = ChapterInfo {
            number: self.number,
            title: self.chapter_title.clone().unwrap_or_default(),
            ..ChapterInfo::new(self.chapter_id.clone(), self.pages)
        };
        ReadingSession::open(manga, chapter, self.from)
    }
}

/// Run a reading session, then close the tracker and report failures
///
/// The tracker is closed on every path, so page turns accepted before an
/// error still reach disk.
pub async fn read(mut tracker: Tracker, args: ReadArgs, output: &Output) -> Result<()> {
    let mut notifications = tracker.take_notifications();

    if args.incognito {
        tracker.set_mode(TrackingMode::Incognito);
    }

    let session = record_session(&tracker, &args, output).await;
    // Loading can create the progress file, so only a recorded session does it
    let progress = match session {
        Ok(true) => tracker.load_progress(&args.manga_id).await,
        _ => Ok(None),
    };
    tracker.close().await;

    let mut failed = false;
    if let Some(ref mut notifications) = notifications {
        while let Ok(notification) = notifications.try_recv() {
            output.notification(&notification);
            failed = true;
        }
    }

    if !session? {
        output.message("Incognito mode: reading progress was not recorded.");
        return Ok(());
    }
    if failed {
        bail!("Reading progress could not be saved");
    }

    if let Some(progress) = progress? {
        output.print_progress(&progress);
    }

    Ok(())
}

/// Turn the pages and leave the reader; false if incognito kept it off the record
async fn record_session(tracker: &Tracker, args: &ReadArgs, output: &Output) -> Result<bool> {
    let turns = args.page_turns()?;
    let mut session = args.session();
    let mut recorded = true;

    for page in turns {
        let outcome = tracker.save_progress(session.page_changed(page)).await?;
        recorded &= outcome == SaveOutcome::Scheduled;
    }

    if let (Some(next), Some(next_pages)) = (args.next.clone(), args.next_pages) {
        let finished = session.on_last_page();
        tracker
            .record(session.switch_chapter(ChapterInfo::new(next.clone(), next_pages)))
            .await?;
        if finished && !args.incognito {
            output.message(&format!("Completed chapter {}", args.chapter_id));
        }
        output.message(&format!("Moved on to chapter {}", next));
    }

    let outcome = tracker.save_progress(session.close()).await?;
    recorded &= outcome == SaveOutcome::Scheduled;

    Ok(recorded)
}
