//! Field definitions.

use crate::value::FieldKind;
use serde::{Deserialize, Serialize};

/// Declaration of one field of an entity.
///
/// Serialized as-is by the schema endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, unique within its entity.
    pub name: String,
    /// Kind of value the field holds.
    pub kind: FieldKind,
    /// Whether the facet index aggregates this field.
    #[serde(default)]
    pub facet: bool,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FieldDef {
    /// Creates a non-facetable field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            facet: false,
            label: None,
        }
    }

    /// Marks the field as facetable.
    #[must_use]
    pub fn facet(mut self) -> Self {
        self.facet = true;
        self
    }

    /// Sets the display label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder() {
        let def = FieldDef::new("team", FieldKind::StringSet).facet().label("Team");
        assert!(def.facet);
        assert_eq!(def.label.as_deref(), Some("Team"));
    }

    #[test]
    fn serializes_without_empty_label() {
        let def = FieldDef::new("name", FieldKind::String);
        assert_eq!(
            serde_json::to_value(&def).unwrap(),
            json!({"name": "name", "kind": "string", "facet": false})
        );
    }

    #[test]
    fn facet_defaults_to_false() {
        let def: FieldDef = serde_json::from_value(json!({"name": "x", "kind": "number"})).unwrap();
        assert!(!def.facet);
    }
}
