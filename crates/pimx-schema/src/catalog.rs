//! # Schema Catalog
//!
//! Builds, compiles and caches one schema per entity type.
//!
//! ## Caching
//!
//! A schema is built on cache miss or when the caller forces a rebuild, and
//! never otherwise. A failed build leaves the cache untouched: a previously
//! cached schema for the same type stays in place and other types are not
//! affected.
//!
//! ## Mapped unique fields
//!
//! Schemas admit the unique fields registered with
//! [`SchemaCatalog::with_unique_fields`], so documents serialized with the
//! same registrations validate even when the catalog does not flag the
//! field unique or mandatory.
//!
//! Every successful build increments a monotonic counter, which also stamps
//! the schema's generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pimx_core::{CatalogReader, UniqueFieldMap};

use crate::cache::SchemaCache;
use crate::descriptor::SchemaDescriptor;
use crate::error::SchemaError;
use crate::validate::CompiledSchema;

/// Per-entity-type schema provider.
pub struct SchemaCatalog {
    reader: Arc<dyn CatalogReader>,
    unique_fields: UniqueFieldMap,
    cache: SchemaCache,
    builds: AtomicU64,
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("unique_fields", &self.unique_fields.len())
            .field("cached", &self.cache.len())
            .field("builds", &self.build_count())
            .finish()
    }
}

impl SchemaCatalog {
    pub fn new(reader: Arc<dyn CatalogReader>) -> Self {
        Self {
            reader,
            unique_fields: UniqueFieldMap::default(),
            cache: SchemaCache::new(),
            builds: AtomicU64::new(0),
        }
    }

    /// Admit the mapped unique fields in every schema built from now on.
    pub fn with_unique_fields(mut self, unique_fields: UniqueFieldMap) -> Self {
        self.unique_fields = unique_fields;
        self
    }

    pub fn unique_fields(&self) -> &UniqueFieldMap {
        &self.unique_fields
    }

    /// The cached schema for `entity_type_id`, building it when missing or
    /// when `force` is set.
    pub fn get_or_build(
        &self,
        entity_type_id: &str,
        force: bool,
    ) -> Result<Arc<CompiledSchema>, SchemaError> {
        if !force {
            if let Some(schema) = self.cache.get(entity_type_id) {
                return Ok(schema);
            }
        }

        let descriptor = SchemaDescriptor::build_with(self.reader.as_ref(), entity_type_id, &self.unique_fields)
            .map_err(|e| {
                tracing::error!(entity_type = %entity_type_id, error = %e, "schema build failed");
                e
            })?;

        let generation = self.build_count() + 1;
        let schema = Arc::new(CompiledSchema::compile(descriptor, generation)?);
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.cache.put(Arc::clone(&schema));

        metrics::counter!("pimx_schema_builds_total", "entity_type" => entity_type_id.to_string())
            .increment(1);
        tracing::debug!(entity_type = %entity_type_id, generation, force, "schema built");

        Ok(schema)
    }

    /// Force-rebuild each listed type.
    ///
    /// Failures are logged and do not stop the remaining rebuilds. Returns
    /// the number of schemas rebuilt.
    pub fn regenerate_all<S: AsRef<str>>(&self, entity_type_ids: &[S]) -> usize {
        let mut rebuilt = 0;
        for id in entity_type_ids {
            match self.get_or_build(id.as_ref(), true) {
                Ok(_) => rebuilt += 1,
                Err(e) => {
                    tracing::warn!(entity_type = %id.as_ref(), error = %e, "schema regeneration skipped");
                }
            }
        }
        rebuilt
    }

    /// Number of successful builds since construction.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn reader(&self) -> &Arc<dyn CatalogReader> {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimx_core::model::{DataType, EntityType, FieldType, LinkType};
    use pimx_core::{InMemoryCatalog, UniqueFieldEntry};

    fn make_type(id: &str) -> EntityType {
        EntityType {
            id: id.to_string(),
            field_types: vec![FieldType {
                id: format!("{id}Name"),
                data_type: DataType::Scalar,
                multivalue: false,
                unique: false,
                mandatory: false,
                cvl_id: None,
            }],
            link_types: vec![],
            field_sets: vec![],
        }
    }

    fn make_catalog() -> SchemaCatalog {
        let reader = InMemoryCatalog::new()
            .with_languages(&["en"])
            .with_entity_type(make_type("Product"))
            .with_entity_type(make_type("Item"))
            .with_entity_type(make_type("Broken"))
            .with_link_type(LinkType {
                id: "BrokenGhost".to_string(),
                source_entity_type_id: "Broken".to_string(),
                target_entity_type_id: "Ghost".to_string(),
                link_entity_type_id: None,
            });
        SchemaCatalog::new(Arc::new(reader))
    }

    #[test]
    fn test_cached_until_forced() {
        let catalog = make_catalog();
        let a = catalog.get_or_build("Item", false).unwrap();
        let b = catalog.get_or_build("Item", false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.build_count(), 1);

        let c = catalog.get_or_build("Item", true).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(catalog.build_count(), 2);
        assert_eq!(c.generation(), 2);
        assert_eq!(a.descriptor(), c.descriptor());
    }

    #[test]
    fn test_failed_build_leaves_other_types_cached() {
        let catalog = make_catalog();
        catalog.get_or_build("Product", false).unwrap();
        let err = catalog.get_or_build("Broken", false).unwrap_err();
        assert_eq!(err.entity_type_id(), "Broken");
        assert!(catalog.cache().contains("Product"));
        assert!(!catalog.cache().contains("Broken"));
        assert_eq!(catalog.build_count(), 1);
    }

    #[test]
    fn test_regenerate_all_continues_past_failures() {
        let catalog = make_catalog();
        let rebuilt = catalog.regenerate_all(&["Product", "Broken", "Item", "Missing"]);
        assert_eq!(rebuilt, 2);
        assert_eq!(catalog.cache().len(), 2);
    }

    #[test]
    fn test_registered_unique_field_reaches_built_schema() {
        let catalog = make_catalog().with_unique_fields(UniqueFieldMap::from_entries([UniqueFieldEntry {
            entity_type_id: "Item".to_string(),
            field_type_id: "ItemName".to_string(),
        }]));
        let schema = catalog.get_or_build("Item", false).unwrap();
        assert_eq!(schema.descriptor().external_unique_id_fields, vec!["ItemName"]);

        let product = catalog.get_or_build("Product", false).unwrap();
        assert!(product.descriptor().external_unique_id_fields.is_empty());
    }

    #[test]
    fn test_invalidate_forces_rebuild_on_next_get() {
        let catalog = make_catalog();
        catalog.get_or_build("Item", false).unwrap();
        catalog.cache().invalidate("Item");
        catalog.get_or_build("Item", false).unwrap();
        assert_eq!(catalog.build_count(), 2);
        catalog.cache().invalidate_all();
        assert!(catalog.cache().is_empty());
    }
}
