//! # Error Types
//!
//! Errors raised while turning entities into stored documents.
//!
//! ## Design
//!
//! - [`SerializationError`] covers one document: the entity could not be
//!   resolved, its schema could not be built, or the assembled document
//!   did not validate. No partial document is ever returned.
//! - [`StoreError`] covers one object write.
//! - [`ExportError`] is the per-unit result callers branch on. Each variant
//!   reports its [`ErrorKind`].

use std::fmt;

use pimx_core::{EntityId, HostError};
use pimx_schema::{SchemaError, SchemaValidationError};
use thiserror::Error;

/// Failure to produce one document.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// The entity id did not resolve to an entity.
    #[error("entity {entity_id} not found")]
    NotFound {
        /// Requested entity.
        entity_id: EntityId,
    },

    /// The entity type's schema could not be built.
    #[error("schema unavailable: {0}")]
    Schema(#[from] SchemaError),

    /// The assembled document did not conform to its schema.
    #[error("{0}")]
    SchemaViolation(#[from] SchemaValidationError),

    /// A host lookup needed for the document failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// The document could not be encoded.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to write one object.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object path is not a relative path inside the store.
    #[error("invalid object path '{path}': {reason}")]
    InvalidPath {
        /// Rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The underlying write failed.
    #[error("io error writing '{path}': {source}")]
    Io {
        /// Object path being written.
        path: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The store refused the write.
    #[error("write to '{path}' rejected: {reason}")]
    Rejected {
        /// Object path being written.
        path: String,
        /// Why the store refused it.
        reason: String,
    },
}

/// Kind of an [`ExportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaGeneration,
    Serialization,
    Storage,
    Host,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SchemaGeneration => "schema_generation",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Storage => "storage",
            ErrorKind::Host => "host",
        };
        f.write_str(name)
    }
}

/// Failure of one export unit (a document, a chunk or a CVL).
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("schema generation failed: {0}")]
    SchemaGeneration(SchemaError),

    #[error("serialization failed: {0}")]
    Serialization(SerializationError),

    #[error("storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("host error: {0}")]
    Host(HostError),
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::SchemaGeneration(_) => ErrorKind::SchemaGeneration,
            ExportError::Serialization(_) => ErrorKind::Serialization,
            ExportError::Storage(_) => ErrorKind::Storage,
            ExportError::Host(_) => ErrorKind::Host,
        }
    }
}

impl From<SerializationError> for ExportError {
    fn from(e: SerializationError) -> Self {
        match e {
            SerializationError::Schema(s) => ExportError::SchemaGeneration(s),
            SerializationError::Host(h) => ExportError::Host(h),
            other => ExportError::Serialization(other),
        }
    }
}

impl From<SchemaError> for ExportError {
    fn from(e: SchemaError) -> Self {
        ExportError::SchemaGeneration(e)
    }
}

impl From<HostError> for ExportError {
    fn from(e: HostError) -> Self {
        ExportError::Host(e)
    }
}

/// Successful result of a write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was stored at this path.
    Written(String),
    /// The entity's type is outside the export allow-list.
    NotExported,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            WriteOutcome::Written(path) => Some(path),
            WriteOutcome::NotExported => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_maps_to_kind() {
        let schema = SerializationError::Schema(SchemaError::EntityTypeNotFound {
            entity_type_id: "Item".to_string(),
        });
        assert_eq!(ExportError::from(schema).kind(), ErrorKind::SchemaGeneration);

        let host = SerializationError::Host(HostError::Unavailable("down".to_string()));
        assert_eq!(ExportError::from(host).kind(), ErrorKind::Host);

        let missing = SerializationError::NotFound {
            entity_id: EntityId(3),
        };
        let err = ExportError::from(missing);
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(err.to_string(), "serialization failed: entity 3 not found");
    }

    #[test]
    fn test_store_error_kind() {
        let err = ExportError::from(StoreError::Rejected {
            path: "Publish/a.json".to_string(),
            reason: "quota".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.kind().to_string(), "storage");
    }

    #[test]
    fn test_write_outcome_accessors() {
        let written = WriteOutcome::Written("Publish/x.json".to_string());
        assert!(written.is_written());
        assert_eq!(written.path(), Some("Publish/x.json"));
        assert_eq!(WriteOutcome::NotExported.path(), None);
    }
}
