//! Schema registry.

use crate::document::{Fields, CREATED_AT_KEY, ID_KEY};
use crate::error::{CoreError, CoreResult};
use crate::schema::entity::{EntityDef, EntitySettings};
use crate::schema::field::FieldDef;
use crate::value::FieldValue;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Holds the definition of every registered entity.
///
/// The registry is read on every request and written only while the
/// process bootstraps, so it sits behind a single `RwLock`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: RwLock<BTreeMap<String, Arc<EntityDef>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a list of definitions.
    pub fn with_entities(defs: impl IntoIterator<Item = EntityDef>) -> CoreResult<Self> {
        let registry = Self::new();
        for def in defs {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Registers or replaces an entity definition.
    pub fn register(&self, def: EntityDef) -> CoreResult<()> {
        def.check()?;
        info!(entity = %def.name, fields = def.fields.len(), "registered entity");
        self.entities.write().insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Returns the definition of an entity.
    pub fn get(&self, entity: &str) -> CoreResult<Arc<EntityDef>> {
        self.entities
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity(entity))
    }

    /// Checks whether an entity is registered.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.read().contains_key(entity)
    }

    /// Returns all registered entity names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entities.read().keys().cloned().collect()
    }

    /// Returns the ordered field definitions of an entity.
    pub fn schema(&self, entity: &str) -> CoreResult<Vec<FieldDef>> {
        Ok(self.get(entity)?.fields.clone())
    }

    /// Returns the display settings of an entity.
    pub fn settings(&self, entity: &str) -> CoreResult<EntitySettings> {
        Ok(self.get(entity)?.settings())
    }

    /// Validates a JSON document body against an entity's fields.
    ///
    /// Any subset of declared fields is accepted. Undeclared names and
    /// values of the wrong kind fail with a field error. The reserved `id`
    /// and `createdAt` keys are skipped; callers check `id` themselves.
    pub fn validate(&self, entity: &str, body: &Map<String, Json>) -> CoreResult<Fields> {
        let def = self.get(entity)?;
        validate_fields(&def, body)
    }
}

/// Coerces a JSON body into typed fields using `def`.
pub(crate) fn validate_fields(def: &EntityDef, body: &Map<String, Json>) -> CoreResult<Fields> {
    let mut fields = BTreeMap::new();
    for (name, json) in body {
        if name == ID_KEY || name == CREATED_AT_KEY {
            continue;
        }
        let field = def.require_field(name)?;
        match FieldValue::from_json(field.kind, json) {
            Ok(Some(value)) => {
                fields.insert(name.clone(), value);
            }
            Ok(None) => {}
            Err(message) => return Err(CoreError::field(name, message)),
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldKind;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::with_entities([EntityDef::new("team", "Team", "member")
            .field(FieldDef::new("name", FieldKind::String))
            .field(FieldDef::new("role", FieldKind::StringSet))
            .field(FieldDef::new("age", FieldKind::Number))])
        .unwrap()
    }

    fn body(value: Json) -> Map<String, Json> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_entity() {
        let registry = registry();
        assert!(matches!(
            registry.schema("ghost"),
            Err(CoreError::UnknownEntity { .. })
        ));
        assert!(matches!(
            registry.settings("ghost"),
            Err(CoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn schema_keeps_declaration_order() {
        let names: Vec<_> = registry()
            .schema("team")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["name", "role", "age"]);
    }

    #[test]
    fn validate_accepts_subsets_and_skips_reserved() {
        let fields = registry()
            .validate("team", &body(json!({"id": "x", "createdAt": "y", "name": "John"})))
            .unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], FieldValue::Text("John".into()));
    }

    #[test]
    fn validate_rejects_unknown_fields() {
        let err = registry()
            .validate("team", &body(json!({"nickname": "JD"})))
            .unwrap_err();
        assert!(matches!(err, CoreError::Field { field, .. } if field == "nickname"));
    }

    #[test]
    fn validate_rejects_wrong_kind() {
        let err = registry()
            .validate("team", &body(json!({"age": "old"})))
            .unwrap_err();
        assert!(matches!(err, CoreError::Field { field, .. } if field == "age"));
    }

    #[test]
    fn null_fields_are_dropped() {
        let fields = registry()
            .validate("team", &body(json!({"name": null, "role": ["dev"]})))
            .unwrap();
        assert!(!fields.contains_key("name"));
        assert!(fields.contains_key("role"));
    }

    #[test]
    fn register_replaces_definition() {
        let registry = registry();
        registry
            .register(EntityDef::new("team", "Crew", "sailor"))
            .unwrap();
        assert_eq!(registry.settings("team").unwrap().title, "Crew");
        assert_eq!(registry.names(), vec!["team"]);
    }
}
