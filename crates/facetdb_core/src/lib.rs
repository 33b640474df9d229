//! # facetdb core
//!
//! Schema-aware document engine for facetdb.
//!
//! This crate provides:
//! - the schema registry: entities, ordered field declarations, settings
//! - typed field values coerced from JSON
//! - a document store with per-document write serialization
//! - a facet index kept in step with every mutation
//! - an attachment manager coupling binaries to document lifecycles
//! - a CRC-checked journal with crash recovery and compaction
//!
//! Everything is reached through [`Engine`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod config;
mod dir;
mod document;
mod engine;
mod error;
mod facet;
mod journal;
mod schema;
mod stats;
mod value;

pub use attachment::{content_type_for, Attachment, SweepReport};
pub use config::{Config, DEFAULT_ATTACHMENT_PREFIX};
pub use document::{CollectionPage, Document, DocumentId, Fields, CREATED_AT_KEY, ID_KEY};
pub use engine::{Engine, EntitySummary, FacetMap};
pub use error::{CoreError, CoreResult};
pub use facet::FacetEntry;
pub use journal::{compute_crc32, JournalRecord, JOURNAL_MAGIC};
pub use schema::{EntityDef, EntitySettings, FieldDef, SchemaRegistry};
pub use stats::StatsSnapshot;
pub use value::{format_date, FieldKind, FieldValue};

/// Crate version, reported by the health endpoint and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
