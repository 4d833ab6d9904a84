//! JSON file persistence for the committed book.

use std::{
    cmp::Reverse,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};

use tally_core::{BookStorage, CoreError};
use tally_domain::{Book, CURRENT_SCHEMA_VERSION};

const BOOK_FILE: &str = "book.json";
const BACKUP_DIR: &str = "backups";
const BACKUP_EXTENSION: &str = "json";
const BACKUP_PREFIX: &str = "book";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = "tmp";
pub const DEFAULT_RETENTION: usize = 5;

/// Where the book file and its backups live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub book_file: PathBuf,
    pub backup_root: PathBuf,
}

impl StoragePaths {
    /// Standard layout under a data directory: `book.json` plus `backups/`.
    pub fn under(data_dir: &Path) -> Self {
        Self {
            book_file: data_dir.join(BOOK_FILE),
            backup_root: data_dir.join(BACKUP_DIR),
        }
    }
}

/// A previous version of the book kept next to the live file.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

/// Stores the book as a single pretty-printed JSON document.
///
/// Saves write a sibling temp file and rename it over the live file, so a crash
/// leaves either the old or the new book on disk. The file being replaced is
/// copied into the backup directory first and only the newest `retention`
/// backups are kept.
#[derive(Debug, Clone)]
pub struct JsonBookStorage {
    paths: StoragePaths,
    retention: usize,
}

impl JsonBookStorage {
    pub fn new(paths: StoragePaths) -> Result<Self, CoreError> {
        Self::with_retention(paths, DEFAULT_RETENTION)
    }

    pub fn with_retention(paths: StoragePaths, retention: usize) -> Result<Self, CoreError> {
        if let Some(parent) = paths.book_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&paths.backup_root)?;
        Ok(Self {
            paths,
            retention: retention.max(1),
        })
    }

    /// Backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        let dir = &self.paths.backup_root;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
                backups.push(BackupInfo {
                    id: file_name.to_string(),
                    created_at: parse_backup_timestamp(file_name),
                    path: path.clone(),
                });
            }
        }
        backups.sort_by_key(|info| Reverse(info.created_at));
        Ok(backups)
    }

    /// Replaces the live book with backup `id` and returns it.
    pub fn restore_backup(&self, id: &str) -> Result<Book, CoreError> {
        let source = self.paths.backup_root.join(id);
        if !source.exists() {
            return Err(CoreError::Persistence(format!("backup `{id}` not found")));
        }
        let book = read_book(&source)?;
        self.save(&book)?;
        tracing::info!(backup = id, "book restored from backup");
        Ok(book)
    }

    fn backup_existing_file(&self) -> Result<(), CoreError> {
        let path = &self.paths.book_file;
        if !path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.paths.backup_root)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT);
        let file_name = format!("{BACKUP_PREFIX}_{timestamp}.{BACKUP_EXTENSION}");
        fs::copy(path, self.paths.backup_root.join(file_name))?;
        self.prune_backups()
    }

    fn prune_backups(&self) -> Result<(), CoreError> {
        for stale in self.list_backups()?.into_iter().skip(self.retention) {
            if let Err(err) = fs::remove_file(&stale.path) {
                tracing::warn!(
                    path = %stale.path.display(),
                    error = %err,
                    "could not prune backup"
                );
            }
        }
        Ok(())
    }
}

impl BookStorage for JsonBookStorage {
    fn load(&self) -> Result<Option<Book>, CoreError> {
        let path = &self.paths.book_file;
        if !path.exists() {
            return Ok(None);
        }
        let book = read_book(path)?;
        tracing::debug!(path = %path.display(), schema_version = book.schema_version, "book read");
        Ok(Some(book))
    }

    fn save(&self, book: &Book) -> Result<(), CoreError> {
        let path = &self.paths.book_file;
        self.backup_existing_file()?;
        let tmp = tmp_path(path);
        write_atomic(&tmp, &serialize_book(book)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Reads a book, refusing files written by a newer schema.
pub fn read_book(path: &Path) -> Result<Book, CoreError> {
    let data = fs::read_to_string(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&data).map_err(|err| CoreError::Serde(err.to_string()))?;
    let version = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(u64::from(CURRENT_SCHEMA_VERSION));
    if version > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(CoreError::Persistence(format!(
            "{} uses schema version {version}, newer than supported {CURRENT_SCHEMA_VERSION}",
            path.display()
        )));
    }
    let mut book: Book =
        serde_json::from_value(value).map_err(|err| CoreError::Serde(err.to_string()))?;
    book.schema_version = CURRENT_SCHEMA_VERSION;
    Ok(book)
}

fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_suffix(&format!(".{BACKUP_EXTENSION}"))?;
    let raw = stem.strip_prefix(&format!("{BACKUP_PREFIX}_"))?;
    NaiveDateTime::parse_from_str(raw, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn serialize_book(book: &Book) -> Result<String, CoreError> {
    serde_json::to_string_pretty(book).map_err(|err| CoreError::Serde(err.to_string()))
}
