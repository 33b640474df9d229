//! Entity definitions.

use crate::document::{CREATED_AT_KEY, ID_KEY};
use crate::error::{CoreError, CoreResult};
use crate::schema::field::FieldDef;
use crate::value::FieldKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;

/// Names that collide with top-level routes of the HTTP layer.
const RESERVED_ENTITY_NAMES: &[&str] = &["attachments", "health"];

/// Full definition of an entity: display settings plus the ordered field
/// list.
///
/// This is the shape entities take in configuration files:
///
/// ```toml
/// [[entities]]
/// name = "team"
/// title = "Our team"
/// item_type = "member"
/// attachment_field = "pic"
///
/// [[entities.fields]]
/// name = "name"
/// kind = "string"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name, used as the first path segment.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Name of a single item, e.g. "member".
    pub item_type: String,
    /// Field holding the document's attachment URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_field: Option<String>,
    /// Free-form pane descriptor served to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane: Option<Json>,
    /// Ordered field declarations.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Display settings of an entity, as served by the settings endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySettings {
    /// Entity name.
    pub entity: String,
    /// Display title.
    pub title: String,
    /// Name of a single item.
    pub item_type: String,
    /// Field holding the attachment URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_field: Option<String>,
}

impl EntityDef {
    /// Creates an entity without fields.
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            item_type: item_type.into(),
            attachment_field: None,
            pane: None,
            fields: Vec::new(),
        }
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Names the attachment field.
    #[must_use]
    pub fn attachment_field(mut self, name: impl Into<String>) -> Self {
        self.attachment_field = Some(name.into());
        self
    }

    /// Sets the pane descriptor.
    #[must_use]
    pub fn pane(mut self, pane: Json) -> Self {
        self.pane = Some(pane);
        self
    }

    /// Checks the definition for internal consistency.
    pub fn check(&self) -> CoreResult<()> {
        let fail = |message: String| Err(CoreError::invalid_schema(&self.name, message));

        let name_ok = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !name_ok {
            return fail("entity names use ASCII letters, digits, '-' and '_'".into());
        }
        if RESERVED_ENTITY_NAMES.contains(&self.name.as_str()) {
            return fail(format!("{:?} is reserved", self.name));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return fail("field names must not be empty".into());
            }
            if field.name == ID_KEY || field.name == CREATED_AT_KEY {
                return fail(format!("field name {:?} is reserved", field.name));
            }
            if !seen.insert(field.name.as_str()) {
                return fail(format!("duplicate field {:?}", field.name));
            }
        }

        if let Some(attachment) = &self.attachment_field {
            match self.field_def(attachment) {
                Some(def) if def.kind == FieldKind::String => {}
                Some(_) => return fail(format!("attachment field {attachment:?} must be a string")),
                None => return fail(format!("attachment field {attachment:?} is not declared")),
            }
        }

        if let Some(pane) = &self.pane {
            if !pane.is_object() {
                return fail("pane must be an object".into());
            }
        }

        Ok(())
    }

    /// Looks up a field declaration by name.
    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field declaration, failing with a field error.
    pub fn require_field(&self, name: &str) -> CoreResult<&FieldDef> {
        self.field_def(name)
            .ok_or_else(|| CoreError::field(name, format!("not declared by entity {}", self.name)))
    }

    /// Names of facetable fields, in declaration order.
    pub fn facet_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.facet)
            .map(|f| f.name.as_str())
    }

    /// Returns the display settings.
    #[must_use]
    pub fn settings(&self) -> EntitySettings {
        EntitySettings {
            entity: self.name.clone(),
            title: self.title.clone(),
            item_type: self.item_type.clone(),
            attachment_field: self.attachment_field.clone(),
        }
    }

    /// Returns the pane descriptor, `{}` when none is configured.
    #[must_use]
    pub fn pane_descriptor(&self) -> Json {
        self.pane
            .clone()
            .unwrap_or_else(|| Json::Object(serde_json::Map::new()))
    }
}
