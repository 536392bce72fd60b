//! Record storage behind the ledger.
//!
//! Storage only moves opaque record lines; chaining and validation live in
//! the ledger. Appends are all-or-nothing: a record is either fully visible
//! to readers or not at all.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};

/// Append-only store of record lines.
pub trait LedgerStorage: Send + Sync {
    /// Persist one record line (without trailing newline).
    fn append_record(&self, line: &str) -> LedgerResult<()>;

    /// Read stored records in order, at most `limit` of them.
    fn read_records(&self, limit: Option<usize>) -> LedgerResult<Vec<String>>;

    /// Flush buffered data to durable storage.
    fn sync(&self) -> LedgerResult<()>;

    /// Release underlying resources. Further appends fail with
    /// [`LedgerError::Closed`].
    fn close(&self) -> LedgerResult<()> {
        self.sync()
    }
}

/// In-process storage, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing record lines, e.g. a copy taken with
    /// [`snapshot`](Self::snapshot).
    pub fn with_records(records: Vec<String>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn snapshot(&self) -> LedgerResult<Vec<String>> {
        self.read_records(None)
    }
}

impl LedgerStorage for MemoryStorage {
    fn append_record(&self, line: &str) -> LedgerResult<()> {
        self.records
            .write()
            .map_err(|_| LedgerError::LockPoisoned)?
            .push(line.to_string());
        Ok(())
    }

    fn read_records(&self, limit: Option<usize>) -> LedgerResult<Vec<String>> {
        let records = self.records.read().map_err(|_| LedgerError::LockPoisoned)?;
        let take = limit.unwrap_or(records.len()).min(records.len());
        Ok(records[..take].to_vec())
    }

    fn sync(&self) -> LedgerResult<()> {
        Ok(())
    }
}

/// How hard [`FileStorage`] pushes each append to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Flush to the OS after every append.
    #[default]
    Flush,
    /// `fsync` file data after every append.
    SyncEachAppend,
}

/// Newline-delimited record file.
///
/// The file handle is owned here and released on [`close`](LedgerStorage::close)
/// or drop. Readers open their own handle.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    durability: Durability,
    file: Mutex<Option<File>>,
}

impl FileStorage {
    /// Open (or create) the record file.
    ///
    /// A trailing partial line left by an interrupted write is truncated.
    pub fn open(path: impl AsRef<Path>, durability: Durability) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        truncate_partial_record(&mut file, &path)?;

        info!(path = %path.display(), ?durability, "Opened ledger file");
        Ok(Self {
            path,
            durability,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn truncate_partial_record(file: &mut File, path: &Path) -> LedgerResult<()> {
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;

    if matches!(contents.last(), None | Some(b'\n')) {
        return Ok(());
    }

    let keep = contents
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = contents.len() - keep,
        "Truncating partial trailing ledger record"
    );
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}

impl LedgerStorage for FileStorage {
    fn append_record(&self, line: &str) -> LedgerResult<()> {
        if line.contains('\n') {
            return Err(LedgerError::InvalidRecord(
                "record line contains a newline".into(),
            ));
        }

        let mut guard = self.file.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let file = guard.as_mut().ok_or(LedgerError::Closed)?;

        let len_before = file.metadata()?.len();
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let written = file.write_all(&buf).and_then(|()| match self.durability {
            Durability::Flush => file.flush(),
            Durability::SyncEachAppend => file.flush().and_then(|()| file.sync_data()),
        });

        if let Err(e) = written {
            warn!(error = %e, "Ledger append failed, rolling back partial write");
            if let Err(rollback) = file.set_len(len_before) {
                warn!(error = %rollback, "Rollback of partial ledger write failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn read_records(&self, limit: Option<usize>) -> LedgerResult<Vec<String>> {
        let mut contents = Vec::new();
        File::open(&self.path)?.read_to_end(&mut contents)?;

        // The last segment is empty or an append still in flight.
        let mut segments: Vec<&[u8]> = contents.split(|&byte| byte == b'\n').collect();
        segments.pop();

        let take = limit.unwrap_or(segments.len()).min(segments.len());
        Ok(segments[..take]
            .iter()
            .map(|segment| String::from_utf8_lossy(segment).into_owned())
            .collect())
    }

    fn sync(&self) -> LedgerResult<()> {
        let guard = self.file.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(file) = guard.as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn close(&self) -> LedgerResult<()> {
        let mut guard = self.file.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(file) = guard.take() {
            file.sync_all()?;
            debug!(path = %self.path.display(), "Closed ledger file");
        }
        Ok(())
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.take() {
                if let Err(e) = file.sync_all() {
                    warn!(error = %e, "Failed to sync ledger file on drop");
                }
            }
        }
    }
}
