//! Engine facade and recovery.

use crate::attachment::{Attachment, AttachmentManager, SweepReport};
use crate::config::Config;
use crate::dir::DataDir;
use crate::document::{CollectionPage, Document, DocumentId, DocumentStore, ID_KEY};
use crate::error::{CoreError, CoreResult};
use crate::facet::{FacetEntry, FacetIndex};
use crate::journal::{Journal, JournalRecord};
use crate::schema::{EntityDef, EntitySettings, FieldDef, SchemaRegistry};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::value::FieldValue;
use chrono::Utc;
use facetdb_storage::{
    BlobStore, FileJournal, FsBlobStore, JournalBackend, MemoryBlobStore, MemoryJournal,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Facet lists keyed by field name.
pub type FacetMap = BTreeMap<String, Vec<FacetEntry>>;

/// Document count and facets of one entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    /// Entity name.
    pub entity: String,
    /// Number of live documents.
    pub documents: usize,
    /// Facets of every facetable field.
    pub facets: FacetMap,
}

/// The facetdb engine.
///
/// `Engine` owns every component and is the only entry point the HTTP
/// layer talks to. All methods take `&self`; the engine is meant to be
/// shared behind an `Arc`.
///
/// # Write path
///
/// A mutation runs under the lock of the document it targets:
///
/// 1. fields are validated against the schema
/// 2. a newly referenced attachment is claimed
/// 3. the new version is journaled
/// 4. facet counts are adjusted
/// 5. the new version becomes visible
///
/// Any failure before step 5 leaves the document untouched. A superseded
/// attachment is detached under the lock, so it cannot be claimed again,
/// and its binary is removed after the lock is released.
///
/// # Example
///
/// ```rust
/// use facetdb_core::{Engine, EntityDef, FieldDef, FieldKind};
/// use serde_json::json;
///
/// let team = EntityDef::new("team", "Our team", "member")
///     .field(FieldDef::new("name", FieldKind::String))
///     .field(FieldDef::new("team", FieldKind::StringSet).facet());
/// let engine = Engine::open_in_memory([team]).unwrap();
///
/// let body = json!({"name": "John", "team": ["Technology"]});
/// let doc = engine.create("team", body.as_object().unwrap()).unwrap();
/// assert_eq!(engine.get("team", doc.id()).unwrap(), doc);
/// assert_eq!(engine.unique_facets("team").unwrap()["team"], vec!["Technology"]);
/// ```
pub struct Engine {
    config: Config,
    /// Holds the directory lock. None for in-memory engines.
    _dir: Option<DataDir>,
    registry: SchemaRegistry,
    store: DocumentStore,
    facets: FacetIndex,
    attachments: AttachmentManager,
    journal: Mutex<Journal>,
    stats: EngineStats,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.registry.names())
            .field("data_dir", &self.config.data_dir)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens an engine as described by `config`.
    ///
    /// With a data directory, the directory is locked, the journal is
    /// replayed and compacted, and attachment state is rebuilt from the
    /// blob store. Without one, everything lives in memory.
    pub fn open(config: Config, entities: impl IntoIterator<Item = EntityDef>) -> CoreResult<Self> {
        let Some(path) = config.data_dir.clone() else {
            return Self::with_backends(
                config,
                entities,
                Box::new(MemoryJournal::new()),
                Box::new(MemoryBlobStore::new()),
            );
        };

        let dir = DataDir::open(&path, config.create_if_missing)?;
        let journal = FileJournal::open(&dir.journal_path())?;
        let blobs = FsBlobStore::open(&dir.attachments_dir())?;
        info!(path = %path.display(), "opening data directory");
        Self::assemble(config, Some(dir), entities, Box::new(journal), Box::new(blobs))
    }

    /// Opens a fresh in-memory engine.
    pub fn open_in_memory(entities: impl IntoIterator<Item = EntityDef>) -> CoreResult<Self> {
        Self::open(Config::default(), entities)
    }

    /// Opens an engine over pre-built backends.
    ///
    /// The journal is replayed exactly like a file-backed one, which makes
    /// this the entry point for recovery tests.
    pub fn with_backends(
        config: Config,
        entities: impl IntoIterator<Item = EntityDef>,
        journal: Box<dyn JournalBackend>,
        blobs: Box<dyn BlobStore>,
    ) -> CoreResult<Self> {
        Self::assemble(config, None, entities, journal, blobs)
    }

    fn assemble(
        config: Config,
        dir: Option<DataDir>,
        entities: impl IntoIterator<Item = EntityDef>,
        journal: Box<dyn JournalBackend>,
        blobs: Box<dyn BlobStore>,
    ) -> CoreResult<Self> {
        let registry = SchemaRegistry::with_entities(entities)?;
        let store = DocumentStore::new();
        let facets = FacetIndex::new();
        for name in registry.names() {
            let def = registry.get(&name)?;
            store.ensure_collection(&name);
            facets.configure(&name, def.facet_fields());
        }

        let engine = Self {
            attachments: AttachmentManager::new(blobs, config.attachment_url_prefix.clone()),
            journal: Mutex::new(Journal::new(journal, config.sync_on_write)),
            config,
            _dir: dir,
            registry,
            store,
            facets,
            stats: EngineStats::new(),
        };
        engine.recover()?;
        Ok(engine)
    }

    /// Rebuilds documents, facets and attachment state from the journal,
    /// then compacts it to one `Put` per live document.
    fn recover(&self) -> CoreResult<()> {
        let records = self.journal.lock().replay()?;
        let replayed = records.len();

        let mut live: BTreeMap<String, HashMap<DocumentId, Document>> = BTreeMap::new();
        for record in records {
            match record {
                JournalRecord::Put { entity, document } => {
                    live.entry(entity).or_default().insert(document.id(), document);
                }
                JournalRecord::Delete { entity, id } => {
                    if let Some(docs) = live.get_mut(&entity) {
                        docs.remove(&id);
                    }
                }
            }
        }

        let mut referenced = Vec::new();
        let mut compacted = Vec::new();
        for (entity, docs) in live {
            let mut docs: Vec<Document> = docs.into_values().collect();
            docs.sort_by_key(Document::seq);
            for doc in &docs {
                self.store.observe_seq(doc.seq());
                compacted.push(JournalRecord::Put {
                    entity: entity.clone(),
                    document: doc.clone(),
                });
            }

            let Ok(def) = self.registry.get(&entity) else {
                warn!(%entity, documents = docs.len(), "journal holds an unregistered entity, keeping its documents untouched");
                continue;
            };
            for doc in &docs {
                if let Some(url) = attachment_url(&def, doc) {
                    referenced.push((url.to_string(), doc.id()));
                }
            }
            self.facets.rebuild(&entity, &docs);
            self.store.load(&entity, docs)?;
        }

        self.attachments.restore(referenced)?;
        let bytes = self.journal.lock().compact(&compacted)?;
        info!(
            replayed,
            live = compacted.len(),
            journal_bytes = bytes,
            "recovery complete"
        );
        Ok(())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Returns the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the current journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.lock().size()
    }

    /// Parses a path segment as a document id of `entity`.
    ///
    /// A malformed id cannot name any document, so it is reported as
    /// not found.
    pub fn document_id(entity: &str, raw: &str) -> CoreResult<DocumentId> {
        raw.parse().map_err(|_| CoreError::not_found(entity, raw))
    }

    // === Schema Registry ===

    /// Returns the ordered field definitions of an entity.
    pub fn schema(&self, entity: &str) -> CoreResult<Vec<FieldDef>> {
        self.registry.schema(entity)
    }

    /// Returns the display settings of an entity.
    pub fn settings(&self, entity: &str) -> CoreResult<EntitySettings> {
        self.registry.settings(entity)
    }

    /// Returns the pane descriptor of an entity.
    pub fn pane(&self, entity: &str) -> CoreResult<Json> {
        Ok(self.registry.get(entity)?.pane_descriptor())
    }

    // === Document Store ===

    /// Returns every live document of an entity, in insertion order.
    pub fn list(&self, entity: &str) -> CoreResult<CollectionPage> {
        self.registry.get(entity)?;
        self.stats.record_scan();
        Ok(CollectionPage::new(self.store.list(entity)?))
    }

    /// Returns one document.
    pub fn get(&self, entity: &str, id: DocumentId) -> CoreResult<Document> {
        self.registry.get(entity)?;
        self.stats.record_read();
        self.store.get(entity, id)
    }

    /// Returns the documents whose `field` matches the raw path segment
    /// `value`: equality for scalars, membership for sets.
    pub fn find_by_property(&self, entity: &str, field: &str, value: &str) -> CoreResult<Vec<Document>> {
        let def = self.registry.get(entity)?;
        let probe = parse_property(&def, field, value)?;
        self.stats.record_scan();
        Ok(self
            .store
            .list(entity)?
            .into_iter()
            .filter(|doc| doc.get(field).is_some_and(|v| v.matches(&probe)))
            .collect())
    }

    /// Creates a document from a JSON body and returns it with its new id.
    pub fn create(&self, entity: &str, body: &Map<String, Json>) -> CoreResult<Document> {
        self.track(self.create_inner(entity, body))
    }

    fn create_inner(&self, entity: &str, body: &Map<String, Json>) -> CoreResult<Document> {
        let def = self.registry.get(entity)?;
        let fields = crate::schema::validate_fields(&def, body)?;
        let doc = Document::new(DocumentId::new(), self.store.next_seq(), Utc::now(), fields);

        let doc = self
            .store
            .insert(entity, doc, |doc| self.commit_put(&def, None, doc))?;
        self.stats.record_write();
        debug!(entity, id = %doc.id(), "created document");
        Ok(doc)
    }

    /// Overwrites every mutable field of a document.
    ///
    /// Fields absent from `body` become unset. An `id` in the body must
    /// match the target; `createdAt` is ignored.
    pub fn replace(&self, entity: &str, id: DocumentId, body: &Map<String, Json>) -> CoreResult<Document> {
        self.track(self.replace_inner(entity, id, body))
    }

    fn replace_inner(&self, entity: &str, id: DocumentId, body: &Map<String, Json>) -> CoreResult<Document> {
        let def = self.registry.get(entity)?;
        match body.get(ID_KEY) {
            None | Some(Json::Null) => {}
            Some(Json::String(s)) if s.parse::<DocumentId>().ok() == Some(id) => {}
            Some(other) => {
                return Err(CoreError::field(
                    ID_KEY,
                    format!("{other} does not match the document id {id}"),
                ))
            }
        }
        let fields = crate::schema::validate_fields(&def, body)?;
        self.mutate(&def, id, |current| Ok(current.with_fields(fields)))
    }

    /// Sets one field from a raw path segment.
    ///
    /// On a set-valued field the value is added as a member.
    pub fn patch_property(&self, entity: &str, id: DocumentId, field: &str, value: &str) -> CoreResult<Document> {
        self.track(self.patch_property_inner(entity, id, field, value))
    }

    fn patch_property_inner(&self, entity: &str, id: DocumentId, field: &str, value: &str) -> CoreResult<Document> {
        let def = self.registry.get(entity)?;
        let value = parse_property(&def, field, value)?;
        let is_set = def.require_field(field)?.kind.is_set();
        self.mutate(&def, id, |current| {
            let value = match (current.get(field), value) {
                (Some(FieldValue::TextSet(members)), FieldValue::TextSet(added)) if is_set => {
                    FieldValue::set(members.iter().chain(added.iter()).cloned())
                }
                (_, value) => value,
            };
            let mut next = current.clone();
            next.set(field, value);
            Ok(next)
        })
    }

    /// Removes one field, or one member of a set-valued field.
    ///
    /// A set that loses its last member is removed entirely. Targeting a
    /// field the document does not carry succeeds without a change.
    pub fn delete_property(&self, entity: &str, id: DocumentId, field: &str, value: &str) -> CoreResult<Document> {
        self.track(self.delete_property_inner(entity, id, field, value))
    }

    fn delete_property_inner(&self, entity: &str, id: DocumentId, field: &str, value: &str) -> CoreResult<Document> {
        let def = self.registry.get(entity)?;
        let is_set = def.require_field(field)?.kind.is_set();
        self.mutate(&def, id, |current| {
            let mut next = current.clone();
            let remaining: Vec<String> = match current.get(field) {
                None => return Ok(next),
                Some(FieldValue::TextSet(members)) if is_set => {
                    members.iter().filter(|m| *m != value).cloned().collect()
                }
                Some(_) => Vec::new(),
            };
            if remaining.is_empty() {
                next.unset(field);
            } else {
                next.set(field, FieldValue::TextSet(remaining));
            }
            Ok(next)
        })
    }

    /// Deletes a document and removes its attachment binary.
    ///
    /// A second delete of the same id fails with `NotFound`.
    pub fn delete(&self, entity: &str, id: DocumentId) -> CoreResult<()> {
        self.track(self.delete_inner(entity, id))
    }

    fn delete_inner(&self, entity: &str, id: DocumentId) -> CoreResult<()> {
        let def = self.registry.get(entity)?;
        let detached = self.store.remove(entity, id, |doc| {
            self.journal.lock().append(&JournalRecord::Delete {
                entity: entity.to_string(),
                id,
            })?;
            self.facets.apply(entity, Some(doc), None);
            Ok(attachment_url(&def, doc).and_then(|url| self.attachments.detach(url)))
        })?;
        if let Some(key) = detached {
            self.attachments.remove_detached(&key);
        }
        self.stats.record_delete();
        debug!(entity, %id, "deleted document");
        Ok(())
    }

    /// Runs a single-document mutation under the document lock.
    ///
    /// `change` computes the next version from the current one. An
    /// unchanged document is returned as is, without journaling.
    fn mutate<F>(&self, def: &EntityDef, id: DocumentId, change: F) -> CoreResult<Document>
    where
        F: FnOnce(&Document) -> CoreResult<Document>,
    {
        let (doc, superseded) = self.store.update(&def.name, id, |current| {
            let next = change(current)?;
            if next == *current {
                return Ok((next.clone(), (next, None)));
            }
            self.commit_put(def, Some(current), &next)?;
            let superseded = attachment_url(def, current)
                .filter(|old| attachment_url(def, &next) != Some(*old))
                .and_then(|old| self.attachments.detach(old));
            Ok((next.clone(), (next, superseded)))
        })?;

        if let Some(key) = superseded {
            self.attachments.remove_detached(&key);
        }
        self.stats.record_write();
        debug!(entity = %def.name, %id, "updated document");
        Ok(doc)
    }

    /// Claims a newly referenced attachment, journals `after` and adjusts
    /// facets. Called with the document lock held.
    fn commit_put(&self, def: &EntityDef, before: Option<&Document>, after: &Document) -> CoreResult<()> {
        let claimed = match (&def.attachment_field, attachment_url(def, after)) {
            (Some(field), Some(url)) if before.and_then(|b| attachment_url(def, b)) != Some(url) => {
                self.attachments.claim(field, &def.name, after.id(), url)?
            }
            _ => None,
        };

        let record = JournalRecord::Put {
            entity: def.name.clone(),
            document: after.clone(),
        };
        if let Err(e) = self.journal.lock().append(&record) {
            if let Some(key) = claimed {
                self.attachments.unclaim(&key);
            }
            return Err(e);
        }

        self.facets.apply(&def.name, before, Some(after));
        Ok(())
    }

    fn track<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // === Facet Index ===

    /// Returns facets with counts.
    ///
    /// With `field`, only that field is returned; it must be facetable.
    /// Without, every facetable field is.
    pub fn facets(&self, entity: &str, field: Option<&str>) -> CoreResult<FacetMap> {
        let def = self.registry.get(entity)?;
        let fields: Vec<&str> = match field {
            Some(name) => {
                if !def.require_field(name)?.facet {
                    return Err(CoreError::field(name, "not a facet field"));
                }
                vec![name]
            }
            None => def.facet_fields().collect(),
        };
        Ok(fields
            .into_iter()
            .map(|f| (f.to_string(), self.facets.facets(entity, f)))
            .collect())
    }

    /// Returns the facet values of every facetable field, without counts.
    pub fn unique_facets(&self, entity: &str) -> CoreResult<BTreeMap<String, Vec<String>>> {
        Ok(self
            .facets(entity, None)?
            .into_iter()
            .map(|(field, entries)| (field, entries.into_iter().map(|e| e.value).collect()))
            .collect())
    }

    /// Recomputes one facet from the live documents.
    pub fn refresh_facet(&self, entity: &str, field: &str) -> CoreResult<()> {
        let def = self.registry.get(entity)?;
        if !def.require_field(field)?.facet {
            return Err(CoreError::field(field, "not a facet field"));
        }
        let docs = self.store.list(entity)?;
        self.facets.refresh(entity, field, &docs);
        Ok(())
    }

    /// Returns document count and facets of an entity.
    pub fn summary(&self, entity: &str) -> CoreResult<EntitySummary> {
        Ok(EntitySummary {
            entity: entity.to_string(),
            documents: self.store.count(entity)?,
            facets: self.facets(entity, None)?,
        })
    }

    // === Attachment Manager ===

    /// Stores an uploaded binary as a pending attachment of `entity`.
    ///
    /// It is bound once a document's attachment field references its URL
    /// and removed by the sweep if that never happens.
    pub fn upload_attachment(
        &self,
        entity: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> CoreResult<Attachment> {
        self.track(self.upload_inner(entity, file_name, content_type, data))
    }

    fn upload_inner(
        &self,
        entity: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> CoreResult<Attachment> {
        let def = self.registry.get(entity)?;
        require_attachment_field(&def)?;
        let attachment = self.attachments.store(entity, file_name, content_type, data)?;
        self.stats.record_upload();
        Ok(attachment)
    }

    /// Stores a binary and binds it to an existing document in one step.
    ///
    /// The previous attachment of the document is removed. If binding
    /// fails, the new binary is removed again.
    pub fn attach_to_document(
        &self,
        entity: &str,
        id: DocumentId,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> CoreResult<(Attachment, Document)> {
        let def = self.registry.get(entity)?;
        let field = require_attachment_field(&def)?.to_string();
        let attachment = self.upload_attachment(entity, file_name, content_type, data)?;

        let url = attachment.url.clone();
        let bound = self.mutate(&def, id, |current| {
            let mut next = current.clone();
            next.set(field, FieldValue::Text(url));
            Ok(next)
        });
        match bound {
            Ok(doc) => Ok((attachment, doc)),
            Err(e) => {
                warn!(entity, %id, error = %e, "binding attachment failed, removing it");
                self.attachments.release(&attachment.url);
                self.stats.record_error();
                Err(e)
            }
        }
    }

    /// Reads a stored binary by entity and file name.
    pub fn attachment(&self, entity: &str, file: &str) -> CoreResult<Option<(Vec<u8>, &'static str)>> {
        self.registry.get(entity)?;
        self.attachments.read(entity, file)
    }

    /// Checks whether an attachment URL points to a stored binary.
    pub fn attachment_exists(&self, url: &str) -> CoreResult<bool> {
        self.attachments.exists(url)
    }

    /// Removes expired pending uploads and retries failed removals.
    pub fn sweep_attachments(&self, now: Instant) -> SweepReport {
        let report = self
            .attachments
            .sweep(now, self.config.pending_attachment_ttl);
        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                retried = report.retried,
                failing = report.failing,
                "attachment sweep"
            );
        }
        report
    }
}

fn attachment_url<'a>(def: &EntityDef, doc: &'a Document) -> Option<&'a str> {
    def.attachment_field
        .as_deref()
        .and_then(|field| doc.text(field))
        .filter(|url| !url.is_empty())
}

fn require_attachment_field(def: &EntityDef) -> CoreResult<&str> {
    def.attachment_field.as_deref().ok_or_else(|| {
        CoreError::field(
            "picture",
            format!("entity {} does not take attachments", def.name),
        )
    })
}

fn parse_property(def: &EntityDef, field: &str, raw: &str) -> CoreResult<FieldValue> {
    let kind = def.require_field(field)?.kind;
    FieldValue::parse_segment(kind, raw).map_err(|message| CoreError::field(field, message))
}
