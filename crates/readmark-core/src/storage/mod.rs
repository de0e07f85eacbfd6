//! Storage layer
//!
//! Handles persistence of the progress database.
//!
//! ## Architecture
//!
//! - **ProgressFile**: blocking whole-file load/save/delete/backup/restore
//! - **Writer task**: owns the `ProgressFile` and serializes every request
//! - **ProgressStore**: the async interface the sync cache is written against

use std::future::Future;

pub mod error;
pub mod persistence;
pub mod writer;

pub use error::{StorageError, StorageResult};
pub use persistence::{ProgressFile, RestoreSource};
pub use writer::{spawn_writer, StoreHandle, WriterTask};

use crate::models::{MangaProgress, ProgressDatabase};

/// Async access to the durable progress database
pub trait ProgressStore: Send + Sync + 'static {
    /// Load the full database, creating it if absent
    fn load(&self) -> impl Future<Output = StorageResult<ProgressDatabase>> + Send;

    /// Merge records by manga ID; returns whether the file changed
    fn save(
        &self,
        entries: Vec<MangaProgress>,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Remove a manga's record after backing up; returns whether it existed
    fn delete(&self, manga_id: String) -> impl Future<Output = StorageResult<bool>> + Send;
}
