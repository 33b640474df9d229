//! Data directory layout and locking.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK            # advisory lock, one process at a time
//! ├─ journal.log     # document journal
//! └─ attachments/    # <entity>/<uuid>.<ext>
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const ATTACHMENTS_DIR: &str = "attachments";

/// An opened data directory.
///
/// Holds an exclusive lock on `LOCK` for as long as it lives; the lock is
/// released when the file handle closes.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens (and optionally creates) a data directory.
    ///
    /// # Errors
    ///
    /// - the directory is missing and `create_if_missing` is false
    /// - another process holds the lock ([`CoreError::DataDirLocked`])
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("data directory does not exist: {}", path.display()),
                )
                .into());
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )
            .into());
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DataDirLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Returns the root of the attachment blob store.
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.path.join(ATTACHMENTS_DIR)
    }
}
