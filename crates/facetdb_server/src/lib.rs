//! # facetdb Server
//!
//! HTTP API for the facetdb entity store.
//!
//! This crate provides:
//! - The axum router mapping entity routes onto [`facetdb_core::Engine`]
//! - JSON error bodies with a stable `kind`
//! - A background sweep for abandoned attachment uploads
//!
//! # Routes
//!
//! | Path | Verb |
//! |---|---|
//! | `/{entity}/collection` | GET, POST |
//! | `/{entity}/collection/{id}` | GET, PUT, DELETE |
//! | `/{entity}/collection/{id}/picture` | POST (multipart) |
//! | `/{entity}/schema`, `/{entity}/settings`, `/{entity}/pane.json` | GET |
//! | `/{entity}/ufacets`, `/{entity}/facets` | GET |
//! | `/{entity}/property/{field}/{value}` | GET |
//! | `/{entity}/{id}/property/{field}/{value}` | PUT, DELETE |
//! | `/{entity}/picture` | POST (multipart) |
//! | `/attachments/{entity}/{file}` | GET |
//! | `/health` | GET |
//!
//! Engine calls run on the blocking pool; a request whose client goes
//! away still completes its mutation.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod state;

pub use config::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
pub use error::{ErrorBody, ServerError, ServerResult};
pub use handler::{FacetQuery, Health, UPLOAD_FIELD};
pub use server::{router, spawn_sweeper, FacetServer};
pub use state::AppState;
