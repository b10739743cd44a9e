//! # Error Types
//!
//! Errors raised by the host capability layer and by settings resolution.
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.
//!
//! ## Design
//!
//! - Host errors name the kind of object and the identifier that failed,
//!   so a failed schema build or serialization can be traced to the
//!   metadata lookup that caused it.
//! - Configuration errors are initialization-time and fatal for an engine
//!   instance; they carry the offending setting key.

use thiserror::Error;

/// Error returned by a [`CatalogReader`](crate::host::CatalogReader).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// A metadata object the caller depends on does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Kind of object (entity type, link type, CVL, ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The host could not answer the request.
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Shorthand for a [`HostError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Error while resolving connector settings or the export mapping.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    #[error("missing setting {key}")]
    MissingSetting {
        /// Setting key.
        key: String,
    },

    /// A setting is present but cannot be interpreted.
    #[error("invalid value {value:?} for setting {key}: {reason}")]
    InvalidSetting {
        /// Setting key.
        key: String,
        /// Raw value found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The export mapping parsed but lacks a required section.
    #[error("invalid export mapping: {reason}")]
    MappingInvalid {
        /// Why the mapping was rejected.
        reason: String,
    },

    /// The export mapping is not valid YAML for the mapping shape.
    #[error("export mapping parse error: {0}")]
    MappingParse(#[from] serde_yaml::Error),

    /// A settings file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
