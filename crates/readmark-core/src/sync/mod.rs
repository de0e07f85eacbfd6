//! Optimistic sync between the reader and the progress store
//!
//! Reads are answered from memory; writes land in memory first and reach
//! disk after a per-manga debounce, with retries and failure notifications.
//!
//! ## Usage
//!
//! ```ignore
//! let cache = SyncCache::new(store, gate, SyncSettings::default());
//! cache.save_progress(update).await?;   // returns immediately
//! cache.flush_all().await;              // before exit
//! ```

mod cache;
mod error;
mod schedule;
mod state;

pub use cache::{
    DeleteOutcome, Notification, NotificationKind, SaveOutcome, SyncCache, SyncSettings,
};
pub use error::{SyncError, SyncResult};
pub use state::EntryState;
