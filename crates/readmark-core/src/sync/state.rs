//! Cache entry state
//!
//! Each cached manga carries a tag saying whether its value is durable,
//! waiting to be written, or stuck after a failed write. Saves never roll
//! back on failure (the value stays, tagged `Failed`); deletes roll back by
//! reinserting the removed entry.

use crate::models::MangaProgress;

/// Durability of a cached value
#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    /// Matches what is on disk
    Clean(MangaProgress),
    /// Changed in memory; `attempt` is the write attempt in progress (0 = not started)
    PendingWrite { value: MangaProgress, attempt: u32 },
    /// Every write attempt failed; the value is kept as-is
    Failed { value: MangaProgress, error: String },
}

impl EntryState {
    pub fn value(&self) -> &MangaProgress {
        match self {
            EntryState::Clean(value)
            | EntryState::PendingWrite { value, .. }
            | EntryState::Failed { value, .. } => value,
        }
    }

    pub(crate) fn value_mut(&mut self) -> &mut MangaProgress {
        match self {
            EntryState::Clean(value)
            | EntryState::PendingWrite { value, .. }
            | EntryState::Failed { value, .. } => value,
        }
    }

    /// Whether the value still needs writing
    pub fn is_dirty(&self) -> bool {
        !matches!(self, EntryState::Clean(_))
    }

    /// Move to a new tag, keeping the value
    pub(crate) fn transition(&mut self, to: impl FnOnce(MangaProgress) -> EntryState) {
        let value = std::mem::take(self.value_mut());
        *self = to(value);
    }
}

/// A cached value plus the revision of the save that produced it
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub state: EntryState,
    pub revision: u64,
}
