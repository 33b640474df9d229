//! Attachment manager.
//!
//! Binaries live in a [`BlobStore`] under `{entity}/{uuid}.{ext}` and are
//! addressed by clients through `{prefix}/{entity}/{uuid}.{ext}`. Each stored
//! key is in exactly one state:
//!
//! - *pending*: uploaded, not yet referenced by any document;
//! - *bound*: referenced by exactly one document's attachment field;
//! - *releasing*: detached from its document, binary about to be removed.
//!
//! A releasing key cannot be claimed again.
//!
//! Pending uploads older than the TTL are swept. Removals that fail are
//! queued and retried by the sweep, so superseded binaries do not linger.

use crate::document::DocumentId;
use crate::error::{CoreError, CoreResult};
use facetdb_storage::{validate_key, BlobStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const OCTET_STREAM: &str = "application/octet-stream";

/// Known extension / content type pairs. The first extension listed for
/// a content type is the one used for new uploads.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

/// Descriptor of a stored binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// URL under which the binary is served.
    pub url: String,
    /// Content type derived from the extension.
    pub content_type: String,
    /// Size in bytes.
    pub size: usize,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending uploads removed because they outlived the TTL.
    pub expired: usize,
    /// Queued removals that succeeded this time.
    pub retried: usize,
    /// Removals still failing, kept for the next sweep.
    pub failing: usize,
}

#[derive(Debug, Default)]
struct State {
    /// key -> owning document.
    bound: HashMap<String, DocumentId>,
    /// key -> upload time.
    pending: HashMap<String, Instant>,
    /// Keys detached from their document whose binary is being removed.
    releasing: HashSet<String>,
    /// Keys whose removal failed.
    failed: HashSet<String>,
}

/// Stores, binds and removes attachment binaries.
pub struct AttachmentManager {
    blobs: Box<dyn BlobStore>,
    prefix: String,
    state: Mutex<State>,
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AttachmentManager")
            .field("prefix", &self.prefix)
            .field("bound", &state.bound.len())
            .field("pending", &state.pending.len())
            .field("releasing", &state.releasing.len())
            .field("failed", &state.failed.len())
            .finish()
    }
}

impl AttachmentManager {
    /// Creates a manager over `blobs`, serving URLs under `prefix`.
    pub fn new(blobs: Box<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self {
            blobs,
            prefix,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the URL prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the URL of a blob key.
    #[must_use]
    pub fn url_for_key(&self, key: &str) -> String {
        format!("{}/{key}", self.prefix)
    }

    /// Returns the blob key behind a URL, if the URL is one of ours.
    #[must_use]
    pub fn key_for_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        validate_key(key).ok()?;
        Some(key.to_string())
    }

    /// Stores a binary as a pending attachment of `entity`.
    ///
    /// The extension comes from the file name when it has a known one,
    /// otherwise from the content type.
    pub fn store(
        &self,
        entity: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> CoreResult<Attachment> {
        let ext = extension_for(file_name, content_type);
        let key = format!("{entity}/{}.{ext}", Uuid::new_v4());
        self.blobs
            .put(&key, data)
            .map_err(|e| CoreError::attachment(format!("storing {key}: {e}")))?;
        self.state.lock().pending.insert(key.clone(), Instant::now());
        debug!(%key, size = data.len(), "stored pending attachment");

        Ok(Attachment {
            url: self.url_for_key(&key),
            content_type: content_type_for(&key).to_string(),
            size: data.len(),
        })
    }

    /// Binds the attachment behind `url` to document `id`.
    ///
    /// URLs outside the prefix are not managed and always accepted. A
    /// managed URL must belong to `entity` and be either pending or
    /// already bound to `id`. Returns the key when a pending upload was
    /// claimed, so the caller can [`unclaim`](Self::unclaim) it if the
    /// surrounding mutation fails.
    pub fn claim(
        &self,
        field: &str,
        entity: &str,
        id: DocumentId,
        url: &str,
    ) -> CoreResult<Option<String>> {
        let Some(key) = self.key_for_url(url) else {
            if url.starts_with(&self.prefix) {
                return Err(CoreError::field(field, format!("malformed attachment URL {url}")));
            }
            return Ok(None);
        };
        if key.split('/').next() != Some(entity) {
            return Err(CoreError::field(
                field,
                format!("attachment {url} belongs to another entity"),
            ));
        }

        let mut state = self.state.lock();
        if state.releasing.contains(&key) {
            return Err(CoreError::field(field, format!("attachment {url} is being removed")));
        }
        match state.bound.get(&key) {
            Some(owner) if *owner == id => return Ok(None),
            Some(_) => {
                return Err(CoreError::field(
                    field,
                    format!("attachment {url} is bound to another document"),
                ))
            }
            None => {}
        }
        if state.pending.remove(&key).is_none() {
            return Err(CoreError::field(field, format!("no such attachment {url}")));
        }
        state.bound.insert(key.clone(), id);
        Ok(Some(key))
    }

    /// Returns a claimed key to the pending state.
    pub fn unclaim(&self, key: &str) {
        let mut state = self.state.lock();
        if state.bound.remove(key).is_some() {
            state.pending.insert(key.to_string(), Instant::now());
        }
    }

    /// Releases the attachment behind `url` and removes its binary.
    ///
    /// Unmanaged URLs are ignored. Failures are logged and queued for the
    /// next sweep.
    pub fn release(&self, url: &str) {
        if let Some(key) = self.detach(url) {
            self.remove_detached(&key);
        }
    }

    /// Detaches the attachment behind `url` from its document and marks it
    /// releasing. Call with the document lock held, then pass the key to
    /// [`remove_detached`](Self::remove_detached) once the lock is dropped.
    pub fn detach(&self, url: &str) -> Option<String> {
        let key = self.key_for_url(url)?;
        let mut state = self.state.lock();
        state.bound.remove(&key);
        state.pending.remove(&key);
        state.releasing.insert(key.clone());
        Some(key)
    }

    /// Removes the binary of a detached key.
    pub fn remove_detached(&self, key: &str) {
        self.remove_blob(key);
        self.state.lock().releasing.remove(key);
    }

    fn remove_blob(&self, key: &str) -> bool {
        match self.blobs.remove(key) {
            Ok(_) => {
                self.state.lock().failed.remove(key);
                debug!(%key, "removed attachment");
                true
            }
            Err(e) => {
                warn!(%key, error = %e, "attachment removal failed, queued for retry");
                self.state.lock().failed.insert(key.to_string());
                false
            }
        }
    }

    /// Reads a stored binary and its content type.
    pub fn read(&self, entity: &str, file: &str) -> CoreResult<Option<(Vec<u8>, &'static str)>> {
        let key = format!("{entity}/{file}");
        if validate_key(&key).is_err() {
            return Ok(None);
        }
        Ok(self
            .blobs
            .get(&key)?
            .map(|data| (data, content_type_for(&key))))
    }

    /// Checks whether a managed URL points to a stored binary.
    pub fn exists(&self, url: &str) -> CoreResult<bool> {
        match self.key_for_url(url) {
            Some(key) => Ok(self.blobs.exists(&key)?),
            None => Ok(false),
        }
    }

    /// Rebuilds the state after recovery.
    ///
    /// `referenced` maps each URL found in an attachment field to its
    /// document. Stored blobs that no document references become pending,
    /// so the next sweep past the TTL removes them.
    pub fn restore(&self, referenced: impl IntoIterator<Item = (String, DocumentId)>) -> CoreResult<()> {
        let mut bound = HashMap::new();
        for (url, id) in referenced {
            if let Some(key) = self.key_for_url(&url) {
                bound.insert(key, id);
            }
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        let mut adopted = 0;
        for key in self.blobs.keys()? {
            if !bound.contains_key(&key) {
                state.pending.insert(key, now);
                adopted += 1;
            }
        }
        state.bound = bound;
        if adopted > 0 {
            info!(adopted, "adopted unreferenced attachments as pending");
        }
        Ok(())
    }

    /// Removes pending uploads older than `ttl` and retries failed removals.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> SweepReport {
        let (expired, retry): (Vec<String>, Vec<String>) = {
            let mut state = self.state.lock();
            let expired: Vec<String> = state
                .pending
                .iter()
                .filter(|(_, at)| now.saturating_duration_since(**at) >= ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                state.pending.remove(key);
            }
            (expired, state.failed.iter().cloned().collect())
        };

        let mut report = SweepReport::default();
        for key in &expired {
            warn!(%key, "removing expired pending attachment");
            if self.remove_blob(key) {
                report.expired += 1;
            }
        }
        for key in &retry {
            if self.remove_blob(key) {
                report.retried += 1;
            }
        }
        report.failing = self.state.lock().failed.len();
        report
    }

    /// Number of pending uploads.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of bound attachments.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.state.lock().bound.len()
    }
}

/// Returns the content type for a key or file name.
#[must_use]
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or(OCTET_STREAM, |&(_, ct)| ct)
}

fn extension_for(file_name: Option<&str>, content_type: Option<&str>) -> String {
    if let Some((_, ext)) = file_name.and_then(|n| n.rsplit_once('.')) {
        let ext = ext.to_ascii_lowercase();
        if CONTENT_TYPES.iter().any(|(e, _)| *e == ext) {
            return ext;
        }
    }
    content_type
        .and_then(|ct| CONTENT_TYPES.iter().find(|(_, c)| c.eq_ignore_ascii_case(ct)))
        .map_or("bin", |&(ext, _)| ext)
        .to_string()
}
