//! Error types for facetdb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in facetdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The entity is not registered in the schema registry.
    #[error("unknown entity: {entity}")]
    UnknownEntity {
        /// Name of the entity.
        entity: String,
    },

    /// A field is undeclared or its value has the wrong kind.
    #[error("field error on {field:?}: {message}")]
    Field {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The targeted document does not exist.
    #[error("document not found: {id} in entity {entity}")]
    DocumentNotFound {
        /// Entity searched.
        entity: String,
        /// Requested document id.
        id: String,
    },

    /// Storing or removing an attachment binary failed.
    #[error("attachment error: {message}")]
    Attachment {
        /// Description of the failure.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] facetdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding or decoding a journal payload failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The journal is corrupted before its tail.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// An entity definition is inconsistent.
    #[error("invalid schema for {entity}: {message}")]
    InvalidSchema {
        /// Entity being registered.
        entity: String,
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: another process has exclusive access")]
    DataDirLocked,
}

impl CoreError {
    /// Creates an unknown entity error.
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity: entity.into(),
        }
    }

    /// Creates a field error.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a document not found error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::DocumentNotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an attachment error.
    pub fn attachment(message: impl Into<String>) -> Self {
        Self::Attachment {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Returns true if the caller sent something wrong (4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity { .. } | Self::Field { .. } | Self::DocumentNotFound { .. }
        )
    }

    /// Returns true if the error means "no such thing" (404 class).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity { .. } | Self::DocumentNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CoreError::unknown_entity("nope").is_client_error());
        assert!(CoreError::unknown_entity("nope").is_not_found());
        assert!(CoreError::field("x", "bad").is_client_error());
        assert!(!CoreError::field("x", "bad").is_not_found());
        assert!(CoreError::not_found("team", "abc").is_not_found());
        assert!(!CoreError::attachment("disk full").is_client_error());
    }

    #[test]
    fn display_names_the_target() {
        let msg = CoreError::not_found("team", "abc").to_string();
        assert!(msg.contains("team"));
        assert!(msg.contains("abc"));
    }
}
