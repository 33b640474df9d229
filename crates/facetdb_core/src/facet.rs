//! Facet index.
//!
//! For every facetable field of every entity the index keeps a map from
//! value to the number of live documents carrying it. Writers feed it a
//! before/after pair for each committed mutation; `refresh` recomputes a
//! field from scratch and must always land on the same counts.

use crate::document::Document;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// One facet value and how many documents carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetEntry {
    /// The value.
    pub value: String,
    /// Number of live documents carrying the value.
    pub count: usize,
}

type Counts = HashMap<String, usize>;

/// Per-entity, per-field value counts.
#[derive(Debug, Default)]
pub struct FacetIndex {
    entities: RwLock<HashMap<String, HashMap<String, Counts>>>,
}

impl FacetIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the facetable fields of an entity, resetting their counts.
    pub fn configure<I, S>(&self, entity: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|f| (f.into(), Counts::new()))
            .collect();
        self.entities.write().insert(entity.to_string(), fields);
    }

    /// Returns the facetable fields of an entity (unordered).
    #[must_use]
    pub fn fields(&self, entity: &str) -> Vec<String> {
        self.entities
            .read()
            .get(entity)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Applies one mutation.
    ///
    /// `before` is `None` for a create and `after` is `None` for a delete.
    pub fn apply(&self, entity: &str, before: Option<&Document>, after: Option<&Document>) {
        let mut entities = self.entities.write();
        let Some(fields) = entities.get_mut(entity) else {
            return;
        };

        for (field, counts) in fields.iter_mut() {
            let old = keys_of(before, field);
            let new = keys_of(after, field);
            for key in old.iter().filter(|k| !new.contains(k)) {
                decrement(counts, key);
            }
            for key in new.iter().filter(|k| !old.contains(k)) {
                *counts.entry(key.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Recomputes one field from the full document set.
    pub fn refresh<'a>(
        &self,
        entity: &str,
        field: &str,
        docs: impl IntoIterator<Item = &'a Document>,
    ) {
        let mut counts = Counts::new();
        for doc in docs {
            for key in keys_of(Some(doc), field) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        debug!(entity, field, values = counts.len(), "refreshed facet");

        let mut entities = self.entities.write();
        if let Some(slot) = entities
            .get_mut(entity)
            .and_then(|fields| fields.get_mut(field))
        {
            *slot = counts;
        }
    }

    /// Recomputes every facetable field of an entity.
    pub fn rebuild(&self, entity: &str, docs: &[Document]) {
        for field in self.fields(entity) {
            self.refresh(entity, &field, docs);
        }
    }

    /// Returns the facet of one field: descending count, then ascending
    /// value. Unknown or non-facetable fields yield an empty list.
    #[must_use]
    pub fn facets(&self, entity: &str, field: &str) -> Vec<FacetEntry> {
        let entities = self.entities.read();
        let Some(counts) = entities.get(entity).and_then(|f| f.get(field)) else {
            return Vec::new();
        };

        let mut entries: Vec<FacetEntry> = counts
            .iter()
            .map(|(value, &count)| FacetEntry {
                value: value.clone(),
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        entries
    }
}

fn keys_of(doc: Option<&Document>, field: &str) -> Vec<String> {
    doc.and_then(|d| d.get(field))
        .map(|v| v.facet_keys())
        .unwrap_or_default()
}

fn decrement(counts: &mut Counts, key: &str) {
    if let Some(count) = counts.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            counts.remove(key);
        }
    }
}
