//! Sync cache errors

use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the sync cache
#[derive(Error, Debug)]
pub enum SyncError {
    /// The update can't be applied as given
    #[error("Invalid progress update: {reason}")]
    InvalidUpdate { reason: String },

    /// Storage failed (load, or a delete that was rolled back)
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SyncResult<T> = Result<T, SyncError>;
