//! readmark Core Library
//!
//! This crate provides the reading-progress engine behind readmark, a manga
//! reader: where each reader stopped, which chapters are finished, and the
//! statistics derived from that history.
//!
//! # Architecture
//!
//! - **Progress file**: one JSON document, rewritten atomically, with a
//!   single-generation backup
//! - **Writer task**: the only code touching the file; requests are handled
//!   one at a time
//! - **Sync cache**: optimistic in-memory values, debounced per manga, with
//!   retries and failure notifications
//!
//! # Quick Start
//!
//! ```text
//! let tracker = Tracker::open()?;
//!
//! // Report a page turn
//! tracker.save_progress(ProgressUpdate::new("manga-1", "ch-12", 4, 20)).await?;
//!
//! // Resume later
//! let progress = tracker.load_progress("manga-1").await?;
//!
//! tracker.close().await;
//! ```
//!
//! # Modules
//!
//! - `tracker`: Unified interface (main entry point)
//! - `models`: Persisted progress records and incoming updates
//! - `completion`: When a chapter counts as completed
//! - `incognito`: Tracking on/off switch
//! - `stats`: Reading statistics
//! - `storage`: Progress file persistence and the writer task
//! - `sync`: Optimistic cache with debounced writes
//! - `config`: Application configuration

pub mod completion;
pub mod config;
pub mod incognito;
pub mod models;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod tracker;

pub use completion::{ChapterInfo, MangaInfo, ReadingSession};
pub use config::{Config, RecoveryPolicy};
pub use incognito::{IncognitoGate, TrackingMode};
pub use models::{ChapterProgress, MangaProgress, ProgressDatabase, ProgressUpdate};
pub use stats::ReadingStats;
pub use storage::{ProgressStore, RestoreSource, StorageError};
pub use sync::{
    DeleteOutcome, EntryState, Notification, NotificationKind, SaveOutcome, SyncError,
};
pub use tracker::Tracker;
