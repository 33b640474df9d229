//! Storage traits.

use crate::error::{StorageError, StorageResult};

/// An append-only byte log backing the document journal.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns every byte appended since the last `truncate`
/// - after `sync` returns, appended data survives process termination
pub trait JournalBackend: Send + Sync {
    /// Appends data to the end of the log and returns its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads the whole log.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Returns the current size of the log in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards everything after `new_size`.
    ///
    /// Used to cut a torn tail after a crash. Fails if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole log with `data`.
    ///
    /// Either the old or the new content survives a crash, never a mix.
    /// Used for compaction.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

/// A keyed store for attachment binaries.
///
/// Implementations are shared between request handlers, so every method
/// takes `&self` and locks internally.
pub trait BlobStore: Send + Sync {
    /// Writes `data` under `key`, replacing any previous binary.
    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Reads the binary stored under `key`.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Checks whether a binary is stored under `key`.
    fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Removes the binary under `key`.
    ///
    /// Returns `false` if nothing was stored there.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists every stored key.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Validates a blob key.
///
/// A key is one or more `/`-separated segments made of ASCII letters,
/// digits, `-`, `_` and `.`, where no segment is empty, `.` or `..`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key(key));
    }
    for segment in key.split('/') {
        let allowed = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if segment.is_empty() || segment == "." || segment == ".." || !allowed {
            return Err(StorageError::invalid_key(key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_keys() {
        assert!(validate_key("team/3f2a.jpg").is_ok());
        assert!(validate_key("a_b-c.d").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/abs", "team/", "../etc/passwd", "team/../x", "a//b", "a\\b", "a b"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
    }
}
