//! Document type.

use crate::document::DocumentId;
use crate::value::{format_date, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Key under which documents render their identifier.
pub const ID_KEY: &str = "id";

/// Key under which documents render their creation time.
pub const CREATED_AT_KEY: &str = "createdAt";

/// Field values of a document, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A stored document.
///
/// Absent fields are "not set", which is different from a field holding
/// an empty string or an empty set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    /// Insertion ordinal within the store, used for list ordering.
    seq: u64,
    created_at: DateTime<Utc>,
    fields: Fields,
}

impl Document {
    /// Creates a document.
    pub fn new(id: DocumentId, seq: u64, created_at: DateTime<Utc>, fields: Fields) -> Self {
        Self {
            id,
            seq,
            created_at,
            fields,
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Returns the insertion ordinal.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns all set fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Returns one field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Checks whether a field is set.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Sets one field.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Unsets one field.
    pub fn unset(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Returns a copy carrying `fields` instead of the current ones.
    ///
    /// Identity and creation time are kept.
    #[must_use]
    pub fn with_fields(&self, fields: Fields) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }

    /// Returns the text value of `field`, if set and textual.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Renders the document as a JSON object: `id`, `createdAt`, then
    /// every set field.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        map.insert(ID_KEY.to_string(), Json::String(self.id.to_string()));
        map.insert(
            CREATED_AT_KEY.to_string(),
            Json::String(format_date(&self.created_at)),
        );
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Json::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::Text("John".into()));
        fields.insert("role".into(), FieldValue::set(["dev"]));
        Document::new(DocumentId::from_bytes([1; 16]), 7, Utc::now(), fields)
    }

    #[test]
    fn json_has_id_and_fields() {
        let json = sample().to_json();
        assert_eq!(json["id"], json!("01010101-0101-0101-0101-010101010101"));
        assert_eq!(json["name"], json!("John"));
        assert_eq!(json["role"], json!(["dev"]));
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn unset_removes_key() {
        let mut doc = sample();
        assert!(doc.unset("role").is_some());
        assert!(!doc.has("role"));
        assert!(doc.to_json().get("role").is_none());
    }

    #[test]
    fn with_fields_keeps_identity() {
        let doc = sample();
        let replaced = doc.with_fields(Fields::new());
        assert_eq!(replaced.id(), doc.id());
        assert_eq!(replaced.seq(), doc.seq());
        assert_eq!(replaced.created_at(), doc.created_at());
        assert!(replaced.fields().is_empty());
    }

    #[test]
    fn text_accessor() {
        let doc = sample();
        assert_eq!(doc.text("name"), Some("John"));
        assert_eq!(doc.text("role"), None);
        assert_eq!(doc.text("missing"), None);
    }
}
