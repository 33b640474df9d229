//! # facetdb Testkit
//!
//! Test utilities for facetdb.
//!
//! This crate provides:
//! - The `team` entity and its 18-member seed data
//! - File-backed engines in temporary directories
//! - Property-based test generators using proptest
//! - Concurrent write helpers
//!
//! ## Usage
//!
//! ```rust
//! use facetdb_testkit::prelude::*;
//!
//! let engine = seeded_engine();
//! assert_eq!(engine.list(TEAM).unwrap().num_found, 18);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
