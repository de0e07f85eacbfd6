//! Single-writer task for the progress file
//!
//! The whole database lives in one file that is read-modify-written on every
//! change, so two overlapping writes for different manga would clobber each
//! other. All file access therefore goes through one task that owns the
//! `ProgressFile` and handles requests strictly in arrival order. Loads are
//! queued too, so a reader never observes a half-finished sequence such as
//! backup-then-delete.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::error::{StorageError, StorageResult};
use super::persistence::{ProgressFile, RestoreSource};
use super::ProgressStore;
use crate::models::{MangaProgress, ProgressDatabase};

/// Requests handled by the writer task
#[derive(Debug)]
enum WriteRequest {
    Load {
        resp: oneshot::Sender<StorageResult<ProgressDatabase>>,
    },
    Save {
        entries: Vec<MangaProgress>,
        resp: oneshot::Sender<StorageResult<bool>>,
    },
    Delete {
        manga_id: String,
        resp: oneshot::Sender<StorageResult<bool>>,
    },
    Backup {
        resp: oneshot::Sender<StorageResult<bool>>,
    },
    Restore {
        resp: oneshot::Sender<StorageResult<RestoreSource>>,
    },
    Shutdown,
}

/// Cloneable handle to the writer task
#[derive(Debug, Clone)]
pub struct StoreHandle {
    request_tx: mpsc::Sender<WriteRequest>,
}

/// Join handle for the writer task, used to wait for it at shutdown
pub type WriterTask = JoinHandle<()>;

/// Spawn the writer task
///
/// Must be called from within a tokio runtime.
pub fn spawn_writer(file: ProgressFile) -> (StoreHandle, WriterTask) {
    let (request_tx, request_rx) = mpsc::channel(64);
    let task = tokio::spawn(writer_loop(Arc::new(file), request_rx));
    (StoreHandle { request_tx }, task)
}

/// Process requests one at a time until shutdown or every handle is dropped
async fn writer_loop(file: Arc<ProgressFile>, mut request_rx: mpsc::Receiver<WriteRequest>) {
    debug!("Progress writer started for {:?}", file.path());

    while let Some(request) = request_rx.recv().await {
        match request {
            WriteRequest::Load { resp } => {
                let result = run_blocking(&file, |f| f.load()).await;
                let _ = resp.send(result);
            }
            WriteRequest::Save { entries, resp } => {
                let count = entries.len();
                let result = run_blocking(&file, move |f| f.save(entries)).await;
                if let Ok(written) = result {
                    if written {
                        info!("Wrote progress for {} manga", count);
                    } else {
                        debug!("Progress unchanged, skipped write");
                    }
                }
                let _ = resp.send(result);
            }
            WriteRequest::Delete { manga_id, resp } => {
                let result = run_blocking(&file, move |f| {
                    let removed = f.delete(&manga_id)?;
                    if removed {
                        info!("Deleted progress for {}", manga_id);
                    }
                    Ok(removed)
                })
                .await;
                let _ = resp.send(result);
            }
            WriteRequest::Backup { resp } => {
                let result = run_blocking(&file, |f| f.backup()).await;
                let _ = resp.send(result);
            }
            WriteRequest::Restore { resp } => {
                let result = run_blocking(&file, |f| f.restore()).await;
                let _ = resp.send(result);
            }
            WriteRequest::Shutdown => break,
        }
    }

    debug!("Progress writer stopped");
}

/// Run a blocking file operation and wait for it before taking the next request
async fn run_blocking<T, F>(file: &Arc<ProgressFile>, op: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ProgressFile) -> StorageResult<T> + Send + 'static,
{
    let file = Arc::clone(file);
    match tokio::task::spawn_blocking(move || op(&file)).await {
        Ok(result) => result,
        // The blocking closure panicked; the file itself is still intact
        // because writes are atomic.
        Err(_) => Err(StorageError::WriterClosed),
    }
}

impl StoreHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StorageResult<T>>) -> WriteRequest,
    ) -> StorageResult<T> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.request_tx
            .send(make(resp_tx))
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        resp_rx.await.map_err(|_| StorageError::WriterClosed)?
    }

    /// Copy the current file over the backup
    pub async fn backup(&self) -> StorageResult<bool> {
        self.request(|resp| WriteRequest::Backup { resp }).await
    }

    /// Copy the backup over the current file
    pub async fn restore(&self) -> StorageResult<RestoreSource> {
        self.request(|resp| WriteRequest::Restore { resp }).await
    }

    /// Ask the writer to stop after the requests already queued
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(WriteRequest::Shutdown).await;
    }
}

impl ProgressStore for StoreHandle {
    async fn load(&self) -> StorageResult<ProgressDatabase> {
        self.request(|resp| WriteRequest::Load { resp }).await
    }

    async fn save(&self, entries: Vec<MangaProgress>) -> StorageResult<bool> {
        self.request(|resp| WriteRequest::Save { entries, resp })
            .await
    }

    async fn delete(&self, manga_id: String) -> StorageResult<bool> {
        self.request(|resp| WriteRequest::Delete { manga_id, resp })
            .await
    }
}
