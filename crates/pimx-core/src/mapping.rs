//! # Export Mapping
//!
//! The YAML document that tells the exporter what to export and how to
//! identify it:
//!
//! ```yaml
//! external_unique_field_types:
//!   - entity_type_id: Item
//!     field_type_id: ItemNumber
//! entity_types_to_export: [Product, Item, Resource]
//! image_configurations: [Original, Thumbnail]
//! excluded_field_types: [ProductInternalNote]
//! ```
//!
//! The first two sections are required. The other two default to empty
//! with a warning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HostError};
use crate::host::CatalogReader;

/// Entity types never included in a generated default mapping.
pub const DEFAULT_EXCLUDED_ENTITY_TYPES: [&str; 4] = ["Section", "Publication", "Task", "Assortment"];

/// One registration of an entity type's external unique field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueFieldEntry {
    pub entity_type_id: String,
    pub field_type_id: String,
}

/// Parsed export mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMapping {
    pub external_unique_field_types: Vec<UniqueFieldEntry>,
    pub entity_types_to_export: Vec<String>,
    pub image_configurations: Vec<String>,
    pub excluded_field_types: Vec<String>,
}

/// Wire shape with every section optional, checked by [`ExportMapping::from_yaml`].
#[derive(Deserialize)]
struct RawMapping {
    external_unique_field_types: Option<Vec<UniqueFieldEntry>>,
    entity_types_to_export: Option<Vec<String>>,
    image_configurations: Option<Vec<String>>,
    excluded_field_types: Option<Vec<String>>,
}

impl ExportMapping {
    /// Parse and check a mapping document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawMapping = serde_yaml::from_str(yaml)?;

        let external_unique_field_types =
            raw.external_unique_field_types
                .ok_or_else(|| ConfigError::MappingInvalid {
                    reason: "missing section external_unique_field_types".to_string(),
                })?;
        let entity_types_to_export =
            raw.entity_types_to_export
                .ok_or_else(|| ConfigError::MappingInvalid {
                    reason: "missing section entity_types_to_export".to_string(),
                })?;

        let image_configurations = raw.image_configurations.unwrap_or_else(|| {
            tracing::warn!("export mapping has no image_configurations section");
            Vec::new()
        });
        let excluded_field_types = raw.excluded_field_types.unwrap_or_else(|| {
            tracing::warn!("export mapping has no excluded_field_types section");
            Vec::new()
        });

        Ok(Self {
            external_unique_field_types,
            entity_types_to_export,
            image_configurations,
            excluded_field_types,
        })
    }

    /// Render as a mapping document.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Whether entities of `entity_type_id` are exported.
    pub fn is_exported(&self, entity_type_id: &str) -> bool {
        self.entity_types_to_export.iter().any(|t| t == entity_type_id)
    }

    /// Whether `field_type_id` is left out of documents.
    pub fn is_excluded(&self, field_type_id: &str) -> bool {
        self.excluded_field_types.iter().any(|f| f == field_type_id)
    }

    /// Build the entity-type → unique-field lookup.
    pub fn unique_field_map(&self) -> UniqueFieldMap {
        UniqueFieldMap::from_entries(self.external_unique_field_types.iter().cloned())
    }

    /// Mapped unique fields that the catalog does not flag as unique.
    ///
    /// Entries naming an unknown entity type or field type are included.
    pub fn unflagged_unique_fields(
        &self,
        reader: &dyn CatalogReader,
    ) -> Result<Vec<UniqueFieldEntry>, HostError> {
        let mut unflagged = Vec::new();
        for entry in &self.external_unique_field_types {
            let flagged = reader
                .entity_type(&entry.entity_type_id)?
                .and_then(|t| t.field_type(&entry.field_type_id).map(|f| f.unique))
                .unwrap_or(false);
            if !flagged {
                unflagged.push(entry.clone());
            }
        }
        Ok(unflagged)
    }

    /// Derive a mapping from the catalog model.
    ///
    /// Registers every field flagged unique, exports every entity type except
    /// [`DEFAULT_EXCLUDED_ENTITY_TYPES`] and materializes every image
    /// configuration. Nothing is excluded.
    pub fn generate_default(reader: &dyn CatalogReader) -> Result<Self, HostError> {
        let entity_types = reader.entity_types()?;

        let external_unique_field_types = entity_types
            .iter()
            .flat_map(|t| {
                t.field_types
                    .iter()
                    .filter(|f| f.unique)
                    .map(|f| UniqueFieldEntry {
                        entity_type_id: t.id.clone(),
                        field_type_id: f.id.clone(),
                    })
            })
            .collect();

        let entity_types_to_export = entity_types
            .iter()
            .map(|t| t.id.clone())
            .filter(|id| !DEFAULT_EXCLUDED_ENTITY_TYPES.contains(&id.as_str()))
            .collect();

        Ok(Self {
            external_unique_field_types,
            entity_types_to_export,
            image_configurations: reader.image_configuration_names()?,
            excluded_field_types: Vec::new(),
        })
    }
}

// ─── Unique-field map ───────────────────────────────────────────────

/// Entity-type id → field-type id used as the external unique identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueFieldMap(BTreeMap<String, String>);

impl UniqueFieldMap {
    /// Build from registrations. The first registration per entity type wins.
    pub fn from_entries(entries: impl IntoIterator<Item = UniqueFieldEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            if let Some(existing) = map.get(&entry.entity_type_id) {
                tracing::warn!(
                    entity_type = %entry.entity_type_id,
                    kept = %existing,
                    ignored = %entry.field_type_id,
                    "duplicate unique field registration ignored"
                );
                continue;
            }
            map.insert(entry.entity_type_id, entry.field_type_id);
        }
        Self(map)
    }

    /// The unique field registered for `entity_type_id`.
    pub fn get(&self, entity_type_id: &str) -> Option<&str> {
        self.0.get(entity_type_id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(t, f)| (t.as_str(), f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCatalog;
    use crate::model::{DataType, EntityType, FieldType, ImageConfiguration};

    const FULL: &str = r#"
external_unique_field_types:
  - entity_type_id: Item
    field_type_id: ItemNumber
  - entity_type_id: Item
    field_type_id: ItemEAN
entity_types_to_export: [Product, Item]
image_configurations: [Original, Thumbnail]
excluded_field_types: [ProductInternalNote]
"#;

    fn make_type(id: &str, unique: &[&str]) -> EntityType {
        EntityType {
            id: id.to_string(),
            field_types: unique
                .iter()
                .map(|f| FieldType {
                    id: f.to_string(),
                    data_type: DataType::Scalar,
                    multivalue: false,
                    unique: true,
                    mandatory: false,
                    cvl_id: None,
                })
                .collect(),
            link_types: vec![],
            field_sets: vec![],
        }
    }

    #[test]
    fn test_parse_full_mapping() {
        let m = ExportMapping::from_yaml(FULL).unwrap();
        assert!(m.is_exported("Item"));
        assert!(!m.is_exported("Resource"));
        assert!(m.is_excluded("ProductInternalNote"));
        assert_eq!(m.image_configurations, vec!["Original", "Thumbnail"]);
    }

    #[test]
    fn test_first_unique_registration_wins() {
        let m = ExportMapping::from_yaml(FULL).unwrap();
        let map = m.unique_field_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Item"), Some("ItemNumber"));
        assert_eq!(map.get("Product"), None);
    }

    #[test]
    fn test_missing_required_section_is_invalid() {
        let err = ExportMapping::from_yaml("entity_types_to_export: [Item]\n").unwrap_err();
        assert!(matches!(err, ConfigError::MappingInvalid { .. }));
        let err = ExportMapping::from_yaml("external_unique_field_types: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MappingInvalid { .. }));
    }

    #[test]
    fn test_missing_optional_sections_default_empty() {
        let m = ExportMapping::from_yaml(
            "external_unique_field_types: []\nentity_types_to_export: [Item]\n",
        )
        .unwrap();
        assert!(m.image_configurations.is_empty());
        assert!(m.excluded_field_types.is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = ExportMapping::from_yaml("entity_types_to_export: {").unwrap_err();
        assert!(matches!(err, ConfigError::MappingParse(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let m = ExportMapping::from_yaml(FULL).unwrap();
        let back = ExportMapping::from_yaml(&m.to_yaml().unwrap()).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn test_generate_default() {
        let catalog = InMemoryCatalog::new()
            .with_entity_type(make_type("Product", &[]))
            .with_entity_type(make_type("Item", &["ItemNumber"]))
            .with_entity_type(make_type("Task", &[]))
            .with_entity_type(make_type("Section", &[]))
            .with_image_configuration(ImageConfiguration {
                name: "Thumbnail".to_string(),
                extension: "jpg".to_string(),
                output_extension: Some("png".to_string()),
            })
            .with_image_configuration(ImageConfiguration {
                name: "Thumbnail".to_string(),
                extension: "tif".to_string(),
                output_extension: Some("png".to_string()),
            });
        let m = ExportMapping::generate_default(&catalog).unwrap();
        assert_eq!(m.entity_types_to_export, vec!["Product", "Item"]);
        assert_eq!(
            m.external_unique_field_types,
            vec![UniqueFieldEntry {
                entity_type_id: "Item".to_string(),
                field_type_id: "ItemNumber".to_string(),
            }]
        );
        assert_eq!(m.image_configurations, vec!["Thumbnail"]);
        assert!(m.excluded_field_types.is_empty());
    }

    #[test]
    fn test_unflagged_unique_fields() {
        let catalog = InMemoryCatalog::new().with_entity_type(make_type("Item", &["ItemNumber"]));
        let m = ExportMapping {
            external_unique_field_types: vec![
                UniqueFieldEntry {
                    entity_type_id: "Item".to_string(),
                    field_type_id: "ItemNumber".to_string(),
                },
                UniqueFieldEntry {
                    entity_type_id: "Product".to_string(),
                    field_type_id: "ProductCode".to_string(),
                },
            ],
            ..Default::default()
        };
        let unflagged = m.unflagged_unique_fields(&catalog).unwrap();
        assert_eq!(unflagged.len(), 1);
        assert_eq!(unflagged[0].entity_type_id, "Product");
    }
}
