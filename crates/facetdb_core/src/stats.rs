//! Engine statistics.
//!
//! All counters are atomic and can be read while operations are in
//! progress.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters of an engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    reads: AtomicU64,
    scans: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    uploads: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Single-document reads.
    pub reads: u64,
    /// Collection scans (list, property queries).
    pub scans: u64,
    /// Creates, replaces and property mutations.
    pub writes: u64,
    /// Document deletes.
    pub deletes: u64,
    /// Stored attachment binaries.
    pub uploads: u64,
    /// Failed operations.
    pub errors: u64,
}

impl EngineStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upload(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Takes a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_write();
        stats.record_write();
        stats.record_delete();
        stats.record_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.writes, 2);
        assert_eq!(snapshot.deletes, 1);
        assert_eq!(snapshot.reads, 0);
        assert_eq!(stats.errors(), 1);
    }
}
