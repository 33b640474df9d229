//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default URL prefix under which attachments are served.
pub const DEFAULT_ATTACHMENT_PREFIX: &str = "/attachments";

/// Configuration for opening an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal after every record (safer but slower).
    pub sync_on_write: bool,

    /// URL prefix of attachment binaries.
    pub attachment_url_prefix: String,

    /// How long an uploaded attachment may stay unreferenced.
    pub pending_attachment_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            create_if_missing: true,
            sync_on_write: true,
            attachment_url_prefix: DEFAULT_ATTACHMENT_PREFIX.to_string(),
            pending_attachment_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the attachment URL prefix.
    #[must_use]
    pub fn attachment_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attachment_url_prefix = prefix.into();
        self
    }

    /// Sets the pending attachment TTL.
    #[must_use]
    pub const fn pending_attachment_ttl(mut self, ttl: Duration) -> Self {
        self.pending_attachment_ttl = ttl;
        self
    }
}
