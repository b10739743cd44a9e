//! # pimx-export — Documents and Storage
//!
//! Everything between a catalog entity and a stored object.
//!
//! ## Serialization (`serializer`, `document`)
//!
//! [`EntitySerializer`] assembles collection documents from entities,
//! their channel links and specification data, and validates each one
//! against the entity type's compiled schema before returning it as a
//! [`DocumentFragment`]. The `document` module derives object names.
//!
//! ## Writing (`writer`, `cvl`, `resources`)
//!
//! - [`DocumentWriter`] applies the export allow-list, serializes, names
//!   and stores entity and batch documents.
//! - [`CvlExporter`] writes controlled value lists.
//! - [`ResourceMaterializer`] copies resource files per image rendition.
//!
//! ## Storage (`store`)
//!
//! The [`ObjectStore`] trait is the only output seam. [`DirectoryStore`]
//! writes under a local directory; [`MemoryStore`] records writes for
//! tests and can inject failures.
//!
//! ## Crate Policy
//!
//! - Depends on `pimx-core` and `pimx-schema` internally.
//! - A document is stored only after it validated in full.
//! - No `.unwrap()` outside tests.

pub mod cvl;
pub mod document;
pub mod error;
pub mod resources;
pub mod serializer;
pub mod store;
pub mod writer;

pub use cvl::{CvlAction, CvlExporter};
pub use document::{
    batch_document_name, cvl_document_path, entity_document_name, object_path, resource_file_path,
    DocumentFragment,
};
pub use error::{ErrorKind, ExportError, SerializationError, StoreError, WriteOutcome};
pub use resources::ResourceMaterializer;
pub use serializer::{resolve_unique_identity, EntitySerializer};
pub use store::{DirectoryStore, MemoryStore, ObjectStore, StoredObject};
pub use writer::DocumentWriter;
