//! Schema generation errors.

use pimx_core::HostError;
use thiserror::Error;

/// A schema could not be built for one entity type.
///
/// Failures are scoped to the type named in the error; schemas already
/// cached for other types are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The host has no such entity type.
    #[error("entity type '{entity_type_id}' not found")]
    EntityTypeNotFound {
        /// Requested entity type.
        entity_type_id: String,
    },

    /// A metadata lookup needed by the build failed.
    #[error("metadata lookup for entity type '{entity_type_id}' failed: {source}")]
    Host {
        /// Entity type being built.
        entity_type_id: String,
        /// Underlying host failure.
        #[source]
        source: HostError,
    },

    /// The rendered JSON Schema did not compile.
    #[error("validator build error for entity type '{entity_type_id}': {reason}")]
    ValidatorBuild {
        /// Entity type being built.
        entity_type_id: String,
        /// Compiler message.
        reason: String,
    },
}

impl SchemaError {
    /// Entity type the failed build was for.
    pub fn entity_type_id(&self) -> &str {
        match self {
            SchemaError::EntityTypeNotFound { entity_type_id }
            | SchemaError::Host { entity_type_id, .. }
            | SchemaError::ValidatorBuild { entity_type_id, .. } => entity_type_id,
        }
    }
}
