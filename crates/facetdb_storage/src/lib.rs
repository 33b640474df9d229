//! # facetdb storage
//!
//! Byte-level storage for facetdb.
//!
//! Two kinds of store live here, and neither interprets what it holds:
//!
//! - [`JournalBackend`]: an append-only byte log. The core crate frames and
//!   decodes journal records on top of it.
//! - [`BlobStore`]: a keyed store for attachment binaries. Keys are
//!   slash-separated relative paths such as `team/4f1c.jpg`.
//!
//! ## Available Backends
//!
//! - [`MemoryJournal`] / [`MemoryBlobStore`] - for tests and ephemeral engines
//! - [`FileJournal`] / [`FsBlobStore`] - persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use facetdb_storage::{BlobStore, JournalBackend, MemoryBlobStore, MemoryJournal};
//!
//! let mut journal = MemoryJournal::new();
//! journal.append(b"record").unwrap();
//! assert_eq!(journal.read_all().unwrap(), b"record");
//!
//! let blobs = MemoryBlobStore::new();
//! blobs.put("team/a.jpg", b"\xff\xd8").unwrap();
//! assert!(blobs.exists("team/a.jpg").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, BlobStore, JournalBackend};
pub use error::{StorageError, StorageResult};
pub use file::{FileJournal, FsBlobStore};
pub use memory::{MemoryBlobStore, MemoryJournal};
