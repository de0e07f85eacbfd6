//! Optimistic progress cache
//!
//! Sits between the reader surface and the progress store. Saves update the
//! in-memory value at once and are written later: each manga has its own
//! debounce task, so a burst of page turns turns into a single durable write
//! of the latest value. Failed writes are retried with exponential backoff;
//! when every attempt fails, one notification is emitted and the in-memory
//! value is kept. Deletes go straight to the store and are rolled back in
//! memory if the store refuses.
//!
//! A write attempt and a delete never interleave: each holds the write order
//! lock from snapshot to store reply, so a delete can't be followed by a
//! stale save of the same manga. When a failed write makes the store reset
//! the file from its backup, every value the cache believed was on disk is
//! queued for writing again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{debug, error, warn};

use super::error::{SyncError, SyncResult};
use super::schedule::{FlushSchedule, FlushSignal};
use super::state::{CacheEntry, EntryState};
use crate::config::Config;
use crate::incognito::IncognitoGate;
use crate::models::{MangaProgress, ProgressDatabase, ProgressUpdate};
use crate::storage::ProgressStore;

/// Timing for debounced, retried writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period before a manga's pending value is written
    pub debounce: Duration,
    /// Write attempts per flush
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one
    pub retry_base: Duration,
    /// Display time attached to failure notifications
    pub notification_duration: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            max_attempts: 3,
            retry_base: Duration::from_secs(1),
            notification_duration: Duration::from_secs(5),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.debounce(),
            max_attempts: config.max_attempts.max(1),
            retry_base: config.retry_base(),
            notification_duration: config.notification_duration(),
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2×base, 4×base, ...
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.retry_base.saturating_mul(1 << exponent)
    }
}

/// What failed, for the UI to pick an icon or wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    SaveFailed,
    DeleteFailed,
}

/// A user-facing failure message
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub manga_id: String,
    pub title: String,
    pub message: String,
    pub duration: Duration,
}

/// Result of a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Cached and queued for writing
    Scheduled,
    /// Ignored because incognito mode is on
    Suppressed,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed from cache and store; `existed` is false if there was nothing to remove
    Deleted { existed: bool },
    /// Ignored because incognito mode is on
    Suppressed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<S> {
    store: S,
    gate: Arc<IncognitoGate>,
    settings: SyncSettings,
    entries: Mutex<HashMap<String, CacheEntry>>,
    flushes: Mutex<FlushSchedule>,
    write_order: AsyncMutex<()>,
    revisions: AtomicU64,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

/// In-memory mirror of reading progress with debounced persistence
pub struct SyncCache<S: ProgressStore> {
    inner: Arc<Inner<S>>,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
}

impl<S: ProgressStore> SyncCache<S> {
    /// Create a cache in front of a store
    ///
    /// Must be used from within a tokio runtime; flushes run as tasks.
    pub fn new(store: S, gate: Arc<IncognitoGate>, settings: SyncSettings) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                store,
                gate,
                settings,
                entries: Mutex::new(HashMap::new()),
                flushes: Mutex::new(FlushSchedule::default()),
                write_order: AsyncMutex::new(()),
                revisions: AtomicU64::new(0),
                notify_tx,
            }),
            notifications: Some(notify_rx),
        }
    }

    /// The gate deciding whether saves and deletes take effect
    pub fn gate(&self) -> &IncognitoGate {
        &self.inner.gate
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Take the notification receiver (can only be called once)
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notifications.take()
    }

    /// Current cache state for a manga, if cached
    pub fn entry_state(&self, manga_id: &str) -> Option<EntryState> {
        lock(&self.inner.entries)
            .get(manga_id)
            .map(|entry| entry.state.clone())
    }

    /// Number of cached values not yet confirmed on disk
    pub fn dirty_count(&self) -> usize {
        lock(&self.inner.entries)
            .values()
            .filter(|entry| entry.state.is_dirty())
            .count()
    }

    /// Flush tasks still waiting or writing
    pub fn active_flushes(&self) -> usize {
        lock(&self.inner.flushes).active()
    }

    /// Drop cached values that match disk, so the next read goes to the store
    ///
    /// Used after the file is replaced underneath the cache (restore).
    /// Unwritten values are kept.
    pub fn evict_clean(&self) -> usize {
        let mut entries = lock(&self.inner.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.state.is_dirty());
        before - entries.len()
    }

    /// Progress for one manga
    ///
    /// Served from the cache when present; otherwise fetched once from the
    /// store and cached. Load errors are returned as-is and nothing is cached.
    pub async fn load_progress(&self, manga_id: &str) -> SyncResult<Option<MangaProgress>> {
        if let Some(value) = self.inner.cached_value(manga_id) {
            debug!("Cache hit for {}", manga_id);
            return Ok(Some(value));
        }

        let durable = self.inner.store.load().await?.manga.remove(manga_id);
        Ok(durable.map(|value| self.inner.insert_clean(value)))
    }

    /// Every manga's progress, most recently read first
    ///
    /// Cached values override what is on disk, since they are newer.
    pub async fn load_all_progress(&self) -> SyncResult<Vec<MangaProgress>> {
        let mut all: Vec<MangaProgress> = self.snapshot().await?.manga.into_values().collect();
        all.sort_by(|a, b| {
            b.last_read_at
                .cmp(&a.last_read_at)
                .then_with(|| a.manga_id.cmp(&b.manga_id))
        });
        Ok(all)
    }

    /// The durable database overlaid with cached values
    ///
    /// May lag a write that is in flight at the same moment.
    pub async fn snapshot(&self) -> SyncResult<ProgressDatabase> {
        let mut db = self.inner.store.load().await?;
        {
            let entries = lock(&self.inner.entries);
            for (manga_id, entry) in entries.iter() {
                db.manga.insert(manga_id.clone(), entry.state.value().clone());
            }
        }
        Ok(db)
    }

    /// Record a progress update
    ///
    /// With incognito on this returns immediately without touching the cache
    /// or the store. Otherwise the update is merged into the cached record at
    /// once and a write is scheduled after the debounce delay, replacing any
    /// write already scheduled for the same manga.
    pub async fn save_progress(&self, update: ProgressUpdate) -> SyncResult<SaveOutcome> {
        if !self.inner.gate.is_tracking() {
            debug!("Incognito: ignoring progress for {}", update.manga_id);
            return Ok(SaveOutcome::Suppressed);
        }
        update
            .validate()
            .map_err(|reason| SyncError::InvalidUpdate { reason })?;

        if self.inner.cached_value(&update.manga_id).is_none() {
            // Start from the durable record so the full-record write keeps
            // chapters this session hasn't touched.
            let durable = self.inner.store.load().await?.manga.remove(&update.manga_id);
            if !self.inner.gate.is_tracking() {
                return Ok(SaveOutcome::Suppressed);
            }
            if let Some(value) = durable {
                self.inner.insert_clean(value);
            }
        }

        self.inner.apply(&update);
        self.inner
            .schedule_flush(&update.manga_id, self.inner.settings.debounce);
        Ok(SaveOutcome::Scheduled)
    }

    /// Remove a manga's progress
    ///
    /// The cached entry is dropped first; if the store fails, the entry is put
    /// back, a notification is emitted and the error returned. Waits for a
    /// write of the same data already under way.
    pub async fn delete_progress(&self, manga_id: &str) -> SyncResult<DeleteOutcome> {
        if !self.inner.gate.is_tracking() {
            debug!("Incognito: ignoring delete for {}", manga_id);
            return Ok(DeleteOutcome::Suppressed);
        }

        let _order = self.inner.write_order.lock().await;
        lock(&self.inner.flushes).cancel(manga_id);
        let previous = lock(&self.inner.entries).remove(manga_id);

        match self.inner.store.delete(manga_id.to_string()).await {
            Ok(existed) => {
                debug!("Removed {} from cache and store", manga_id);
                Ok(DeleteOutcome::Deleted {
                    existed: existed || previous.is_some(),
                })
            }
            Err(e) => {
                warn!("Deleting progress for {} failed, rolling back: {}", manga_id, e);
                if let Some(entry) = previous {
                    let dirty = entry.state.is_dirty();
                    lock(&self.inner.entries)
                        .entry(manga_id.to_string())
                        .or_insert(entry);
                    if dirty {
                        self.inner
                            .schedule_flush(manga_id, self.inner.settings.debounce);
                    }
                }
                if e.rolled_back() {
                    self.inner.requeue_clean();
                }
                self.inner.notify(Notification {
                    kind: NotificationKind::DeleteFailed,
                    manga_id: manga_id.to_string(),
                    title: "Failed to delete progress".to_string(),
                    message: e.to_string(),
                    duration: self.inner.settings.notification_duration,
                });
                Err(e.into())
            }
        }
    }

    /// Write every pending value now and wait for all writes to finish
    ///
    /// Values whose earlier writes failed get another round of attempts.
    pub async fn flush_all(&self) {
        let failed: Vec<String> = lock(&self.inner.entries)
            .iter()
            .filter(|(_, entry)| matches!(entry.state, EntryState::Failed { .. }))
            .map(|(manga_id, _)| manga_id.clone())
            .collect();
        for manga_id in &failed {
            self.inner
                .schedule_flush(manga_id, self.inner.settings.debounce);
        }

        // Flushes can queue more flushes (after a reset file), so drain until idle
        loop {
            let handles = lock(&self.inner.flushes).drain();
            if handles.is_empty() {
                break;
            }
            debug!("Waiting for {} flush task(s)", handles.len());
            join_all(handles).await;
        }
    }
}

impl<S: ProgressStore> Inner<S> {
    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn cached_value(&self, manga_id: &str) -> Option<MangaProgress> {
        lock(&self.entries)
            .get(manga_id)
            .map(|entry| entry.state.value().clone())
    }

    /// Cache a durable value unless something newer is already cached
    fn insert_clean(&self, value: MangaProgress) -> MangaProgress {
        let revision = self.next_revision();
        lock(&self.entries)
            .entry(value.manga_id.clone())
            .or_insert(CacheEntry {
                state: EntryState::Clean(value),
                revision,
            })
            .state
            .value()
            .clone()
    }

    /// Optimistically merge an update into the cache
    fn apply(&self, update: &ProgressUpdate) {
        let now = Utc::now();
        let revision = self.next_revision();
        let mut entries = lock(&self.entries);

        match entries.get_mut(&update.manga_id) {
            Some(entry) => {
                entry.state.value_mut().apply(update, now);
                entry
                    .state
                    .transition(|value| EntryState::PendingWrite { value, attempt: 0 });
                entry.revision = revision;
            }
            None => {
                entries.insert(
                    update.manga_id.clone(),
                    CacheEntry {
                        state: EntryState::PendingWrite {
                            value: MangaProgress::from_update(update, now),
                            attempt: 0,
                        },
                        revision,
                    },
                );
            }
        }
    }

    /// Arm (or re-arm) the flush task for a manga
    fn schedule_flush(self: &Arc<Self>, manga_id: &str, delay: Duration) {
        let (control_tx, control_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).flush_after(
            manga_id.to_string(),
            delay,
            control_rx,
        ));
        lock(&self.flushes).arm(manga_id.to_string(), control_tx, task);
        debug!("Flush for {} scheduled in {:?}", manga_id, delay);
    }

    /// Wait out the debounce delay, then write
    async fn flush_after(
        self: Arc<Self>,
        manga_id: String,
        delay: Duration,
        control: oneshot::Receiver<FlushSignal>,
    ) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            signal = control => {
                if signal == Ok(FlushSignal::Cancel) {
                    debug!("Flush for {} cancelled", manga_id);
                    return;
                }
            }
        }

        self.flush_with_retry(&manga_id).await;
    }

    async fn flush_with_retry(self: &Arc<Self>, manga_id: &str) {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut revision = 0;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let order = self.write_order.lock().await;
            let Some((snapshot, snapshot_revision)) = self.begin_attempt(manga_id, attempt) else {
                debug!("Nothing left to flush for {}", manga_id);
                return;
            };
            revision = snapshot_revision;

            let result = self.store.save(vec![snapshot]).await;
            drop(order);

            match result {
                Ok(_) => {
                    self.mark_clean(manga_id, revision);
                    return;
                }
                Err(e) => {
                    warn!(
                        "Saving progress for {} failed (attempt {}/{}): {}",
                        manga_id, attempt, max_attempts, e
                    );
                    if e.rolled_back() {
                        self.requeue_clean();
                    }
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.backoff(attempt)).await;
            }
        }

        if self.mark_failed(manga_id, revision, &last_error) {
            error!(
                "Giving up on saving progress for {} after {} attempts",
                manga_id, max_attempts
            );
            self.notify(Notification {
                kind: NotificationKind::SaveFailed,
                manga_id: manga_id.to_string(),
                title: "Failed to save progress".to_string(),
                message: format!(
                    "Reading progress could not be saved after {} attempts: {}",
                    max_attempts, last_error
                ),
                duration: self.settings.notification_duration,
            });
        }
    }

    /// Snapshot the latest value for a write attempt
    ///
    /// `None` when the entry was deleted or already written by a newer flush.
    fn begin_attempt(&self, manga_id: &str, attempt: u32) -> Option<(MangaProgress, u64)> {
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(manga_id)?;
        if !entry.state.is_dirty() {
            return None;
        }
        entry
            .state
            .transition(|value| EntryState::PendingWrite { value, attempt });
        Some((entry.state.value().clone(), entry.revision))
    }

    /// Queue every value believed to be on disk for another write
    ///
    /// Called after the store replaced the file, which may have dropped them.
    fn requeue_clean(self: &Arc<Self>) {
        let requeued: Vec<String> = {
            let mut entries = lock(&self.entries);
            entries
                .iter_mut()
                .filter(|(_, entry)| matches!(entry.state, EntryState::Clean(_)))
                .map(|(manga_id, entry)| {
                    entry
                        .state
                        .transition(|value| EntryState::PendingWrite { value, attempt: 0 });
                    entry.revision = self.next_revision();
                    manga_id.clone()
                })
                .collect()
        };

        if !requeued.is_empty() {
            warn!(
                "Progress file was reset; rewriting {} cached value(s)",
                requeued.len()
            );
        }
        for manga_id in &requeued {
            self.schedule_flush(manga_id, self.settings.debounce);
        }
    }

    fn mark_clean(&self, manga_id: &str, revision: u64) {
        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(manga_id) {
            if entry.revision == revision {
                entry.state.transition(EntryState::Clean);
            }
        }
    }

    /// Tag the entry as failed unless a newer save superseded the write
    fn mark_failed(&self, manga_id: &str, revision: u64, error: &str) -> bool {
        let mut entries = lock(&self.entries);
        match entries.get_mut(manga_id) {
            Some(entry) if entry.revision == revision => {
                entry.state.transition(|value| EntryState::Failed {
                    value,
                    error: error.to_string(),
                });
                true
            }
            _ => false,
        }
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is fine
        let _ = self.notify_tx.send(notification);
    }
}
