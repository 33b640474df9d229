//! Entity schemas and the schema registry.

mod entity;
mod field;
mod registry;

pub use entity::{EntityDef, EntitySettings};
pub use field::FieldDef;
pub(crate) use registry::validate_fields;
pub use registry::SchemaRegistry;
