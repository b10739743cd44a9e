//! # pimx-schema — Per-Entity-Type Schemas
//!
//! Derives, for each entity type, the structural contract its exported
//! documents must satisfy, and enforces it.
//!
//! ## Descriptors (`descriptor`)
//!
//! [`SchemaDescriptor::build`] reads live metadata through the
//! [`CatalogReader`](pimx_core::CatalogReader) seam: field shapes, link
//! sub-shapes keyed by the other endpoint's identifying fields, CVL key
//! enumerations and the known language set. Descriptors render to JSON
//! Schema Draft 2020-12 via [`SchemaDescriptor::to_json_schema`].
//!
//! ## Validation (`validate`)
//!
//! [`CompiledSchema`] pairs a descriptor with its compiled `jsonschema`
//! validator. Rejections carry structured [`Violation`]s.
//!
//! ## Catalog (`catalog`, `cache`)
//!
//! [`SchemaCatalog::get_or_build`] serves schemas from a mutex-guarded
//! [`SchemaCache`], building on miss or on force.
//!
//! ## Crate Policy
//!
//! - Depends only on `pimx-core` internally.
//! - A failed build for one type never evicts or alters another type's
//!   cached schema.

pub mod cache;
pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod validate;

pub use cache::SchemaCache;
pub use catalog::SchemaCatalog;
pub use descriptor::{collection_key, FieldKind, FieldShape, LinkShape, SchemaDescriptor};
pub use error::SchemaError;
pub use validate::{CompiledSchema, SchemaValidationError, ValidationViolations, Violation};
