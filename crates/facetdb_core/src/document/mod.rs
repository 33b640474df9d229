//! Documents and the document store.

mod doc;
mod id;
mod store;

pub use doc::{Document, Fields, CREATED_AT_KEY, ID_KEY};
pub use id::DocumentId;
pub use store::{CollectionPage, DocumentStore};
