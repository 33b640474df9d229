//! Document store with per-document write serialization.

use crate::document::{Document, DocumentId};
use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A page of documents as returned by `list`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPage {
    /// Number of documents found. Always equals `docs.len()`.
    pub num_found: usize,
    /// The documents, in insertion order.
    pub docs: Vec<Document>,
}

impl CollectionPage {
    /// Wraps a list of documents.
    #[must_use]
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            num_found: docs.len(),
            docs,
        }
    }

    /// Renders the page as `{"response": {"numFound", "docs"}}`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let docs: Vec<Json> = self.docs.iter().map(Document::to_json).collect();
        json!({ "response": { "numFound": self.num_found, "docs": docs } })
    }
}

/// One document plus its liveness flag.
///
/// A slot is marked dead under its own lock before it leaves the index, so
/// a writer that fetched the slot just before a delete sees `NotFound`
/// instead of resurrecting the document.
#[derive(Debug)]
struct Slot {
    doc: Document,
    live: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

#[derive(Debug, Default)]
struct Collection {
    by_id: HashMap<DocumentId, SlotRef>,
    /// Insertion order: seq -> id.
    order: BTreeMap<u64, DocumentId>,
}

/// Keyed collections of documents, one per entity.
///
/// # Locking
///
/// - Each document sits behind its own mutex. Mutations of the same
///   document are serialized; different documents proceed independently.
/// - The per-entity index is a `RwLock` held only for lookups and for
///   inserting or removing entries. Nothing waits on a document mutex
///   while holding an index lock in read mode, and deletes take the
///   index write lock only after the document mutex, so the two lock
///   orders never cross.
///
/// Mutations take a `commit` closure that runs while the document lock is
/// held. The engine uses it to journal the change and update facets, so
/// those side effects are ordered exactly like the document writes.
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
    next_seq: AtomicU64,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure an (empty) collection exists for `entity`.
    pub fn ensure_collection(&self, entity: &str) {
        if self.collections.read().contains_key(entity) {
            return;
        }
        self.collections
            .write()
            .entry(entity.to_string())
            .or_default();
    }

    /// Reserves the next insertion ordinal.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Makes sure later ordinals come after `seq`.
    pub fn observe_seq(&self, seq: u64) {
        self.next_seq.fetch_max(seq + 1, Ordering::SeqCst);
    }

    fn collection(&self, entity: &str) -> CoreResult<Arc<RwLock<Collection>>> {
        self.collections
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity(entity))
    }

    fn slot(&self, entity: &str, id: DocumentId) -> CoreResult<SlotRef> {
        let collection = self.collection(entity)?;
        let index = collection.read();
        index
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(entity, id))
    }

    /// Inserts a new document.
    ///
    /// `commit` runs before the document becomes visible; if it fails,
    /// nothing is inserted.
    pub fn insert<F>(&self, entity: &str, doc: Document, commit: F) -> CoreResult<Document>
    where
        F: FnOnce(&Document) -> CoreResult<()>,
    {
        let collection = self.collection(entity)?;
        commit(&doc)?;

        let mut index = collection.write();
        index.order.insert(doc.seq(), doc.id());
        index.by_id.insert(
            doc.id(),
            Arc::new(Mutex::new(Slot {
                doc: doc.clone(),
                live: true,
            })),
        );
        Ok(doc)
    }

    /// Loads documents without running any commit hook.
    ///
    /// Used by recovery. Later ordinals are reserved past the highest seq
    /// loaded.
    pub fn load(&self, entity: &str, docs: impl IntoIterator<Item = Document>) -> CoreResult<()> {
        self.ensure_collection(entity);
        let collection = self.collection(entity)?;
        let mut index = collection.write();
        for doc in docs {
            self.observe_seq(doc.seq());
            index.order.insert(doc.seq(), doc.id());
            index
                .by_id
                .insert(doc.id(), Arc::new(Mutex::new(Slot { doc, live: true })));
        }
        Ok(())
    }

    /// Returns one document.
    pub fn get(&self, entity: &str, id: DocumentId) -> CoreResult<Document> {
        let slot = self.slot(entity, id)?;
        let slot = slot.lock();
        if !slot.live {
            return Err(CoreError::not_found(entity, id));
        }
        Ok(slot.doc.clone())
    }

    /// Returns every live document of `entity`, in insertion order.
    pub fn list(&self, entity: &str) -> CoreResult<Vec<Document>> {
        let collection = self.collection(entity)?;
        let slots: Vec<SlotRef> = {
            let index = collection.read();
            index
                .order
                .values()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect()
        };

        Ok(slots
            .iter()
            .filter_map(|slot| {
                let slot = slot.lock();
                slot.live.then(|| slot.doc.clone())
            })
            .collect())
    }

    /// Returns the number of live documents of `entity`.
    pub fn count(&self, entity: &str) -> CoreResult<usize> {
        Ok(self.collection(entity)?.read().by_id.len())
    }

    /// Replaces a document with the one computed by `mutate`.
    ///
    /// `mutate` sees the current document under its lock and returns the
    /// new version plus a value to hand back. If it fails, the document is
    /// left untouched.
    pub fn update<T, F>(&self, entity: &str, id: DocumentId, mutate: F) -> CoreResult<T>
    where
        F: FnOnce(&Document) -> CoreResult<(Document, T)>,
    {
        let slot = self.slot(entity, id)?;
        let mut slot = slot.lock();
        if !slot.live {
            return Err(CoreError::not_found(entity, id));
        }
        let (next, out) = mutate(&slot.doc)?;
        debug_assert_eq!(next.id(), slot.doc.id());
        slot.doc = next;
        Ok(out)
    }

    /// Removes a document after `commit` succeeds.
    pub fn remove<T, F>(&self, entity: &str, id: DocumentId, commit: F) -> CoreResult<T>
    where
        F: FnOnce(&Document) -> CoreResult<T>,
    {
        let collection = self.collection(entity)?;
        let slot = self.slot(entity, id)?;
        let mut slot = slot.lock();
        if !slot.live {
            return Err(CoreError::not_found(entity, id));
        }
        let out = commit(&slot.doc)?;
        slot.live = false;

        let mut index = collection.write();
        index.by_id.remove(&id);
        index.order.remove(&slot.doc.seq());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Fields;
    use crate::value::FieldValue;
    use chrono::Utc;
    use std::thread;

    fn store() -> DocumentStore {
        let store = DocumentStore::new();
        store.ensure_collection("team");
        store
    }

    fn doc(store: &DocumentStore, name: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::Text(name.into()));
        Document::new(DocumentId::new(), store.next_seq(), Utc::now(), fields)
    }

    fn ok(_: &Document) -> CoreResult<()> {
        Ok(())
    }

    #[test]
    fn list_is_insertion_ordered() {
        let store = store();
        for name in ["a", "b", "c"] {
            store.insert("team", doc(&store, name), ok).unwrap();
        }

        let names: Vec<_> = store
            .list("team")
            .unwrap()
            .iter()
            .map(|d| d.text("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(store.count("team").unwrap(), 3);

        let page = CollectionPage::new(store.list("team").unwrap()).to_json();
        assert_eq!(page["response"]["numFound"], 3);
        assert_eq!(page["response"]["docs"][1]["name"], "b");
    }

    #[test]
    fn failed_commit_inserts_nothing() {
        let store = store();
        let result = store.insert("team", doc(&store, "a"), |_| {
            Err(CoreError::attachment("boom"))
        });
        assert!(result.is_err());
        assert_eq!(store.count("team").unwrap(), 0);
    }

    #[test]
    fn unknown_collection() {
        let store = store();
        assert!(matches!(
            store.list("ghost"),
            Err(CoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn update_applies_only_on_success() {
        let store = store();
        let id = store.insert("team", doc(&store, "a"), ok).unwrap().id();

        let failed: CoreResult<()> =
            store.update("team", id, |_| Err(CoreError::field("name", "nope")));
        assert!(failed.is_err());
        assert_eq!(store.get("team", id).unwrap().text("name"), Some("a"));

        store
            .update("team", id, |current| {
                let mut next = current.clone();
                next.set("name", FieldValue::Text("b".into()));
                Ok((next, ()))
            })
            .unwrap();
        assert_eq!(store.get("team", id).unwrap().text("name"), Some("b"));
    }

    #[test]
    fn remove_then_not_found() {
        let store = store();
        let id = store.insert("team", doc(&store, "a"), ok).unwrap().id();

        store.remove("team", id, ok).unwrap();
        assert!(matches!(
            store.get("team", id),
            Err(CoreError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            store.remove("team", id, ok),
            Err(CoreError::DocumentNotFound { .. })
        ));
        assert!(store.list("team").unwrap().is_empty());
    }

    #[test]
    fn load_reserves_following_seqs() {
        let store = DocumentStore::new();
        let old = Document::new(DocumentId::new(), 41, Utc::now(), Fields::new());
        store.load("team", [old]).unwrap();
        assert_eq!(store.next_seq(), 42);
        assert_eq!(store.count("team").unwrap(), 1);
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(store());
        let id = store.insert("team", doc(&store, "x"), ok).unwrap().id();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .update("team", id, |current| {
                                let mut next = current.clone();
                                let member = format!("t{t}-{i}");
                                let mut members = match next.get("tags") {
                                    Some(FieldValue::TextSet(m)) => m.clone(),
                                    _ => Vec::new(),
                                };
                                members.push(member);
                                next.set("tags", FieldValue::TextSet(members));
                                Ok((next, ()))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        match store.get("team", id).unwrap().get("tags") {
            Some(FieldValue::TextSet(members)) => assert_eq!(members.len(), 400),
            other => panic!("unexpected tags: {other:?}"),
        }
    }
}
