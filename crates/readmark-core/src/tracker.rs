//! Unified progress tracking interface
//!
//! The `Tracker` wires the pieces together:
//! - the writer task owning the progress file
//! - the sync cache in front of it
//! - the incognito gate shared by both reading and the UI toggle
//!
//! ## Usage
//!
//! ```ignore
//! let mut tracker = Tracker::open()?;  // inside a tokio runtime
//!
//! let mut session = ReadingSession::open(manga, chapter, 0);
//! tracker.save_progress(session.page_changed(4)).await?;
//! tracker.record(session.switch_chapter(next)).await?;
//!
//! tracker.close().await;  // flushes pending writes
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::incognito::{IncognitoGate, TrackingMode};
use crate::models::{MangaProgress, ProgressUpdate};
use crate::stats::ReadingStats;
use crate::storage::{spawn_writer, ProgressFile, RestoreSource, StoreHandle, WriterTask};
use crate::sync::{
    DeleteOutcome, EntryState, Notification, SaveOutcome, SyncCache, SyncSettings,
};

/// Reading progress tracker
pub struct Tracker {
    cache: SyncCache<StoreHandle>,
    store: StoreHandle,
    writer: WriterTask,
    gate: Arc<IncognitoGate>,
    config: Config,
}

impl Tracker {
    /// Open the tracker using the configuration on disk
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the tracker with a specific configuration
    ///
    /// Must be called from within a tokio runtime. The progress file is not
    /// touched until the first read or write.
    pub fn open_with_config(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let file = ProgressFile::new(&config);
        debug!("Opening progress file at {}", file.path().display());
        let (store, writer) = spawn_writer(file);

        let gate = Arc::new(IncognitoGate::new());
        let cache = SyncCache::new(
            store.clone(),
            Arc::clone(&gate),
            SyncSettings::from_config(&config),
        );

        Ok(Self {
            cache,
            store,
            writer,
            gate,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Progress ====================

    /// Progress for one manga, if any has been recorded
    pub async fn load_progress(&self, manga_id: &str) -> Result<Option<MangaProgress>> {
        self.cache
            .load_progress(manga_id)
            .await
            .with_context(|| format!("Failed to load progress for '{}'", manga_id))
    }

    /// All recorded progress, most recently read first
    pub async fn load_all_progress(&self) -> Result<Vec<MangaProgress>> {
        self.cache
            .load_all_progress()
            .await
            .context("Failed to load reading history")
    }

    /// Record one progress update
    pub async fn save_progress(&self, update: ProgressUpdate) -> Result<SaveOutcome> {
        let manga_id = update.manga_id.clone();
        self.cache
            .save_progress(update)
            .await
            .with_context(|| format!("Failed to save progress for '{}'", manga_id))
    }

    /// Record a batch of updates in order, e.g. a chapter transition
    pub async fn record(&self, updates: Vec<ProgressUpdate>) -> Result<()> {
        for update in updates {
            self.save_progress(update).await?;
        }
        Ok(())
    }

    /// Remove a manga from the reading history
    pub async fn delete_progress(&self, manga_id: &str) -> Result<DeleteOutcome> {
        self.cache
            .delete_progress(manga_id)
            .await
            .with_context(|| format!("Failed to delete progress for '{}'", manga_id))
    }

    /// Cache state for a manga, for status display
    pub fn entry_state(&self, manga_id: &str) -> Option<EntryState> {
        self.cache.entry_state(manga_id)
    }

    /// Values accepted but not yet on disk
    pub fn pending_writes(&self) -> usize {
        self.cache.dirty_count()
    }

    // ==================== Statistics ====================

    /// Reading statistics over everything recorded so far
    pub async fn statistics(&self) -> Result<ReadingStats> {
        let snapshot = self
            .cache
            .snapshot()
            .await
            .context("Failed to load progress for statistics")?;
        Ok(ReadingStats::from_database(
            &snapshot,
            self.config.seconds_per_page,
        ))
    }

    // ==================== Incognito ====================

    pub fn mode(&self) -> TrackingMode {
        self.gate.mode()
    }

    pub fn is_incognito(&self) -> bool {
        !self.gate.is_tracking()
    }

    /// Flip incognito mode, returning the new mode
    pub fn toggle_incognito(&self) -> TrackingMode {
        self.gate.toggle()
    }

    pub fn set_mode(&self, mode: TrackingMode) {
        self.gate.set(mode);
    }

    /// Watch mode changes (e.g. to update a toggle label)
    pub fn subscribe_mode(&self) -> watch::Receiver<TrackingMode> {
        self.gate.subscribe()
    }

    /// Take the failure notification receiver (can only be called once)
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.cache.take_notifications()
    }

    // ==================== Maintenance ====================

    /// Write pending values, then copy the progress file over the backup
    pub async fn backup(&self) -> Result<bool> {
        self.cache.flush_all().await;
        self.store
            .backup()
            .await
            .context("Failed to back up progress")
    }

    /// Replace the progress file with the backup
    ///
    /// Pending values are written first so they are not lost in the swap;
    /// cached values are then dropped so later reads see the restored file.
    pub async fn restore(&self) -> Result<RestoreSource> {
        self.cache.flush_all().await;
        let source = self
            .store
            .restore()
            .await
            .context("Failed to restore progress")?;
        let evicted = self.cache.evict_clean();
        debug!("Evicted {} cached entries after restore", evicted);
        Ok(source)
    }

    /// Write every pending value now
    pub async fn flush(&self) {
        self.cache.flush_all().await;
    }

    /// Flush pending writes and stop the writer task
    pub async fn close(self) {
        self.cache.flush_all().await;
        self.store.shutdown().await;
        if self.writer.await.is_err() {
            warn!("Progress writer task ended abnormally");
        }
        info!("Progress tracker closed");
    }
}
