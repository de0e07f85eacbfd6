//! Progress file persistence
//!
//! Owns the single JSON document holding every manga's reading progress.
//! Every save or delete rewrites the whole file using atomic writes (write to
//! temp file, fsync, then rename), so the primary file is never left
//! half-written.
//!
//! Storage location: `~/.local/share/readmark/` (configurable via `Config`)
//!
//! Files:
//! - `progress.json` - The progress database
//! - `progress.backup.json` - Single-generation backup taken before deletes
//!
//! These methods block; the writer task runs them off the async runtime.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::{StorageError, StorageResult};
use crate::config::{Config, RecoveryPolicy};
use crate::models::{MangaProgress, ProgressDatabase};

/// Where a restore took its contents from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// The backup file was copied over the primary
    Backup,
    /// No usable backup existed; an empty database was written
    Empty,
}

impl std::fmt::Display for RestoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreSource::Backup => write!(f, "the backup"),
            RestoreSource::Empty => write!(f, "an empty database"),
        }
    }
}

/// Blocking access to the progress file and its backup
#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
    backup_path: PathBuf,
    recovery: RecoveryPolicy,
}

impl ProgressFile {
    /// Create a handler using the paths from the configuration
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.progress_path(),
            backup_path: config.backup_path(),
            recovery: config.recovery,
        }
    }

    /// Path of the primary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the backup file
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Check if the progress file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Check if a backup exists on disk
    pub fn has_backup(&self) -> bool {
        self.backup_path.exists()
    }

    /// Load the database, creating an empty one if the file is absent
    ///
    /// Returns `StorageError::Corrupt` if the file exists but can't be parsed.
    pub fn load(&self) -> StorageResult<ProgressDatabase> {
        if let Some(db) = read_database(&self.path)? {
            return Ok(db);
        }

        let db = ProgressDatabase::empty(Utc::now());
        self.write(&db)?;
        info!("Created new progress database at {:?}", self.path);
        Ok(db)
    }

    /// Merge entries by manga ID and rewrite the file
    ///
    /// Returns `false` when every entry already matched the stored record;
    /// in that case the file is left untouched.
    pub fn save(&self, entries: Vec<MangaProgress>) -> StorageResult<bool> {
        let result = (|| {
            let mut db = self.load()?;
            if !db.merge(entries, Utc::now()) {
                return Ok(false);
            }
            self.write(&db)?;
            Ok(true)
        })();

        self.recover(result)
    }

    /// Back up, then remove a manga's record and rewrite the file
    ///
    /// Returns whether a record was removed. A failed backup aborts the
    /// delete without touching either file.
    pub fn delete(&self, manga_id: &str) -> StorageResult<bool> {
        self.backup()?;

        let result = (|| {
            let mut db = self.load()?;
            if db.remove(manga_id, Utc::now()).is_none() {
                return Ok(false);
            }
            self.write(&db)?;
            Ok(true)
        })();

        self.recover(result)
    }

    /// Copy the primary file over the backup
    ///
    /// Returns `false` when there is no primary file to back up.
    pub fn backup(&self) -> StorageResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }

        let bytes = fs::read(&self.path).map_err(|e| StorageError::from_read(e, self.path.clone()))?;
        atomic_write(&self.backup_path, &bytes, "backup")?;

        info!("Backed up progress to {:?}", self.backup_path);
        Ok(true)
    }

    /// Copy the backup over the primary file
    ///
    /// Falls back to writing an empty database when the backup is missing
    /// or unreadable, so the primary always ends up parseable.
    pub fn restore(&self) -> StorageResult<RestoreSource> {
        let backup = match fs::read(&self.backup_path) {
            Ok(bytes) => match serde_json::from_slice::<ProgressDatabase>(&bytes) {
                Ok(_) => Some(bytes),
                Err(e) => {
                    warn!("Ignoring unparseable backup {:?}: {}", self.backup_path, e);
                    None
                }
            },
            Err(_) => None,
        };

        match backup {
            Some(bytes) => {
                atomic_write(&self.path, &bytes, "restore")?;
                info!("Restored progress from backup {:?}", self.backup_path);
                Ok(RestoreSource::Backup)
            }
            None => {
                let db = ProgressDatabase::empty(Utc::now());
                let bytes = serde_json::to_vec_pretty(&db)?;
                atomic_write(&self.path, &bytes, "restore")?;
                info!("No backup available, reset {:?} to an empty database", self.path);
                Ok(RestoreSource::Empty)
            }
        }
    }

    /// Apply the recovery policy to a failed mutation
    ///
    /// The original error is always returned. When the restore replaced the
    /// primary file it comes wrapped in `StorageError::RolledBack`, so callers
    /// holding values they believe are on disk know to write them again.
    fn recover<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        let Err(error) = result else {
            return result;
        };

        match self.recovery {
            RecoveryPolicy::Restore => {
                warn!("Progress write failed ({}), restoring backup", error);
                match self.restore() {
                    Ok(restored) => Err(StorageError::RolledBack {
                        source: Box::new(error),
                        restored,
                    }),
                    Err(restore_error) => {
                        warn!("Restore after failed write also failed: {}", restore_error);
                        Err(error)
                    }
                }
            }
            RecoveryPolicy::Propagate => {
                debug!("Progress write failed ({}), leaving files as-is", error);
                Err(error)
            }
        }
    }

    fn write(&self, db: &ProgressDatabase) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(db)?;
        atomic_write(&self.path, &bytes, "save")
    }
}

/// Read and parse a database file, `None` if it doesn't exist
fn read_database(path: &Path) -> StorageResult<Option<ProgressDatabase>> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|e| StorageError::from_read(e, path.to_path_buf()))?;
    let db = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    Ok(Some(db))
}

/// Temp file used while atomically replacing `path`
///
/// Each kind of write gets its own temp name so a stuck temp file from one
/// operation can't block another.
pub(crate) fn temp_path(path: &Path, purpose: &str) -> PathBuf {
    path.with_extension(format!("{}.tmp", purpose))
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8], purpose: &str) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = temp_path(path, purpose);

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    // Sync to disk before rename
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressUpdate;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    fn entry(manga_id: &str, chapter_id: &str, page: u32) -> MangaProgress {
        let update = ProgressUpdate {
            manga_title: format!("Title {}", manga_id),
            ..ProgressUpdate::new(manga_id, chapter_id, page, 20)
        };
        MangaProgress::from_update(&update, Utc::now())
    }

    /// Make the next save fail by occupying its temp path with a directory
    fn jam_saves(file: &ProgressFile) {
        fs::create_dir_all(temp_path(file.path(), "save")).unwrap();
    }

    fn unjam_saves(file: &ProgressFile) {
        fs::remove_dir_all(temp_path(file.path(), "save")).unwrap();
    }

    #[test]
    fn test_load_creates_empty_database() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        assert!(!file.exists());
        let db = file.load().unwrap();
        assert!(file.exists());
        assert_eq!(db.version, 1);
        assert!(db.manga.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));
        fs::write(file.path(), b"{ not json").unwrap();

        let err = file.load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        assert!(file.save(vec![entry("m1", "c1", 4), entry("m2", "c9", 0)]).unwrap());

        let db = file.load().unwrap();
        assert_eq!(db.manga.len(), 2);
        assert_eq!(db.manga["m1"].chapters["c1"].current_page, 4);
    }

    #[test]
    fn test_save_replaces_whole_record() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        file.save(vec![entry("m1", "c2", 7)]).unwrap();

        let db = file.load().unwrap();
        let manga = &db.manga["m1"];
        assert_eq!(manga.chapters.len(), 1);
        assert!(manga.chapters.contains_key("c2"));
    }

    #[test]
    fn test_identical_save_leaves_file_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));
        let progress = entry("m1", "c1", 4);

        assert!(file.save(vec![progress.clone()]).unwrap());
        let once = fs::read(file.path()).unwrap();

        assert!(!file.save(vec![progress]).unwrap());
        let twice = fs::read(file.path()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_delete_takes_backup() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4), entry("m2", "c1", 1)]).unwrap();
        assert!(file.delete("m1").unwrap());

        let db = file.load().unwrap();
        assert!(!db.manga.contains_key("m1"));
        assert!(db.manga.contains_key("m2"));

        let backup: ProgressDatabase =
            serde_json::from_slice(&fs::read(file.backup_path()).unwrap()).unwrap();
        assert!(backup.manga.contains_key("m1"));
    }

    #[test]
    fn test_delete_missing_entry() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        assert!(!file.delete("nope").unwrap());
        assert_eq!(file.load().unwrap().manga.len(), 1);
    }

    #[test]
    fn test_backup_without_primary() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        assert!(!file.backup().unwrap());
        assert!(!file.has_backup());
    }

    #[test]
    fn test_backup_overwrites_previous() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 1)]).unwrap();
        file.backup().unwrap();
        file.save(vec![entry("m2", "c1", 1)]).unwrap();
        file.backup().unwrap();

        let backup: ProgressDatabase =
            serde_json::from_slice(&fs::read(file.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.manga.len(), 2);
    }

    #[test]
    fn test_restore_from_backup() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        file.backup().unwrap();
        file.save(vec![entry("m2", "c1", 0)]).unwrap();

        assert_eq!(file.restore().unwrap(), RestoreSource::Backup);
        let db = file.load().unwrap();
        assert_eq!(db.manga.len(), 1);
        assert!(db.manga.contains_key("m1"));
    }

    #[test]
    fn test_restore_without_backup_writes_empty() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();

        assert_eq!(file.restore().unwrap(), RestoreSource::Empty);
        assert!(file.load().unwrap().manga.is_empty());
    }

    #[test]
    fn test_failed_save_restores_backup() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        file.backup().unwrap();

        jam_saves(&file);
        let err = file.save(vec![entry("m2", "c1", 0)]).unwrap_err();
        match err {
            StorageError::RolledBack { source, restored } => {
                assert!(matches!(*source, StorageError::WriteError { .. }));
                assert_eq!(restored, RestoreSource::Backup);
            }
            other => panic!("expected rolled back error, got {:?}", other),
        }
        unjam_saves(&file);

        // Never unparseable: the pre-write state came back from the backup
        let db = file.load().unwrap();
        assert_eq!(db.manga.len(), 1);
        assert!(db.manga.contains_key("m1"));
    }

    #[test]
    fn test_failed_save_without_backup_leaves_valid_empty_database() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();

        jam_saves(&file);
        let err = file.save(vec![entry("m2", "c1", 0)]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::RolledBack {
                restored: RestoreSource::Empty,
                ..
            }
        ));
        unjam_saves(&file);

        let db = file.load().unwrap();
        assert!(db.manga.is_empty());
    }

    #[test]
    fn test_failed_save_with_propagate_policy_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            recovery: RecoveryPolicy::Propagate,
            ..test_config(&temp_dir)
        };
        let file = ProgressFile::new(&config);

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        let before = fs::read(file.path()).unwrap();

        jam_saves(&file);
        let err = file.save(vec![entry("m2", "c1", 0)]).unwrap_err();
        assert!(!err.rolled_back());
        unjam_saves(&file);

        assert_eq!(fs::read(file.path()).unwrap(), before);
        assert!(!file.has_backup());
    }

    #[test]
    fn test_restore_ignores_corrupt_backup() {
        let temp_dir = TempDir::new().unwrap();
        let file = ProgressFile::new(&test_config(&temp_dir));

        file.save(vec![entry("m1", "c1", 4)]).unwrap();
        fs::write(file.backup_path(), b"garbage").unwrap();

        assert_eq!(file.restore().unwrap(), RestoreSource::Empty);
        assert!(file.load().unwrap().manga.is_empty());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("progress.json");

        atomic_write(&nested_path, b"{}", "save").unwrap();

        assert!(nested_path.exists());
        assert!(!temp_path(&nested_path, "save").exists());
        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "{}");
    }
}
