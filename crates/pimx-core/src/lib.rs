//! # pimx-core — Foundational Types for Channel Export
//!
//! This crate is the leaf of the PIMX workspace. It defines the catalog
//! data model the exporter works on, the read-only capability trait through
//! which the host catalog is reached, an in-memory host, connector settings
//! and the export mapping. Every other crate in the workspace depends on
//! `pimx-core`; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Narrow host seam.** Schema generation, serialization and change
//!    propagation read the catalog only through [`CatalogReader`]. Host
//!    entity objects never leak past it.
//!
//! 2. **Newtype identifiers.** [`EntityId`], [`ChannelId`] and [`FileId`]
//!    keep numeric ids from being swapped at call sites.
//!
//! 3. **Settings resolve once.** [`ExportSettings::from_settings`] checks
//!    every key up front; a bad configuration fails at initialization, not
//!    halfway through an export.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `pimx-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod mapping;
pub mod memory;
pub mod model;
pub mod temporal;

pub use config::{ExportSettings, SettingsMap};
pub use error::{ConfigError, HostError};
pub use host::CatalogReader;
pub use identity::{ChannelId, EntityId, FileId};
pub use mapping::{ExportMapping, UniqueFieldEntry, UniqueFieldMap};
pub use memory::InMemoryCatalog;
pub use model::{
    Category, Cvl, CvlValue, DataType, Entity, EntityAction, EntityType, FieldData, FieldType,
    ImageConfiguration, Link, LinkType, LoadLevel, LocaleString, SpecificationField,
    SpecificationFieldType, StoredFile,
};
pub use temporal::Timestamp;
