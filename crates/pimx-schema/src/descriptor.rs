//! # Schema Descriptors
//!
//! A [`SchemaDescriptor`] is the structural contract for documents of one
//! entity type, derived from live catalog metadata. It is plain data with
//! structural equality, so two builds from unchanged metadata compare equal,
//! and it renders to a JSON Schema (Draft 2020-12) document.
//!
//! ## Document shape
//!
//! ```json
//! { "Items": [ {
//!     "EntityId": 5, "Action": "New",
//!     "FieldSet": "Apparel", "ExternalUniqueIdField": "ItemNumber",
//!     "Fields": [ { "FieldTypeId": "ItemColor", "Cvl": "Colors", "Data": ["Red"] } ],
//!     "Links": { "ParentLinks": [ ... ], "ChildLinks": [ ... ] },
//!     "Additionals": { "SpecificationData": [ ... ] }
//! } ] }
//! ```
//!
//! Every field carries its values as an array: one string for scalars,
//! `{Language, Value}` pairs for localized text, CVL keys for controlled
//! values (more than one only when multivalue).
//!
//! ## Identifying fields
//!
//! The legal `ExternalUniqueIdField` names of a type are its fields flagged
//! both unique and mandatory, plus the field the export mapping registers
//! for it. Link entries name the other endpoint by `EntityId`, any field
//! flagged unique on its type, or the field mapped for its type. A mapped
//! field is legal even when the catalog does not flag it.

use pimx_core::model::{DataType, EntityType, ENTITY_ID_FIELD};
use pimx_core::{CatalogReader, HostError, UniqueFieldMap};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::SchemaError;

/// JSON Schema dialect of rendered schemas.
pub const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Entity actions a document may carry.
pub const ENTITY_ACTIONS: [&str; 3] = ["New", "Updated", "Deleted"];

/// Link actions a link entry may carry.
pub const LINK_ACTIONS: [&str; 1] = ["Deleted"];

/// Shape of one declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldShape {
    pub field_type_id: String,
    pub kind: FieldKind,
}

/// Value class of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Scalar,
    LocaleString,
    Cvl {
        cvl_id: String,
        /// Legal keys, including the empty key.
        values: Vec<String>,
        multivalue: bool,
    },
}

/// Shape of entries of one link type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkShape {
    pub link_type_id: String,
    pub source_entity_type_id: String,
    pub target_entity_type_id: String,
    /// Legal identifying fields of the other endpoint: `EntityId`, every
    /// field flagged unique on the other type, and its mapped field.
    pub unique_field_names: Vec<String>,
}

/// Structural contract of one entity type's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    pub entity_type_id: String,
    pub field_sets: Vec<String>,
    /// Fields flagged both unique and mandatory, then the mapped field.
    pub external_unique_id_fields: Vec<String>,
    pub languages: Vec<String>,
    /// CVL ids referenced by the type's fields, deduplicated.
    pub cvl_ids: Vec<String>,
    /// Field shapes in declaration order.
    pub fields: Vec<FieldShape>,
    /// Shapes of inbound link types.
    pub parent_links: Vec<LinkShape>,
    /// Shapes of outbound link types.
    pub child_links: Vec<LinkShape>,
}

impl SchemaDescriptor {
    /// Derive the descriptor of `entity_type_id` from current metadata,
    /// without mapped unique fields.
    pub fn build(reader: &dyn CatalogReader, entity_type_id: &str) -> Result<Self, SchemaError> {
        Self::build_with(reader, entity_type_id, &UniqueFieldMap::default())
    }

    /// Derive the descriptor, also admitting the unique fields registered
    /// in `unique_fields`.
    pub fn build_with(
        reader: &dyn CatalogReader,
        entity_type_id: &str,
        unique_fields: &UniqueFieldMap,
    ) -> Result<Self, SchemaError> {
        let host = |source: HostError| SchemaError::Host {
            entity_type_id: entity_type_id.to_string(),
            source,
        };

        let entity_type = reader
            .entity_type(entity_type_id)
            .map_err(host)?
            .ok_or_else(|| SchemaError::EntityTypeNotFound {
                entity_type_id: entity_type_id.to_string(),
            })?;

        let languages = reader.languages().map_err(host)?;

        let mut cvl_ids: Vec<String> = Vec::new();
        let mut fields = Vec::with_capacity(entity_type.field_types.len());
        for field_type in &entity_type.field_types {
            let kind = match (&field_type.data_type, &field_type.cvl_id) {
                (DataType::Cvl, Some(cvl_id)) => {
                    if !cvl_ids.contains(cvl_id) {
                        cvl_ids.push(cvl_id.clone());
                    }
                    let mut values = vec![String::new()];
                    for value in reader.cvl_values(cvl_id).map_err(host)? {
                        if !values.contains(&value.key) {
                            values.push(value.key);
                        }
                    }
                    FieldKind::Cvl {
                        cvl_id: cvl_id.clone(),
                        values,
                        multivalue: field_type.multivalue,
                    }
                }
                (DataType::LocaleString, _) => FieldKind::LocaleString,
                _ => FieldKind::Scalar,
            };
            fields.push(FieldShape {
                field_type_id: field_type.id.clone(),
                kind,
            });
        }

        let mut external_unique_id_fields: Vec<String> = entity_type
            .field_types
            .iter()
            .filter(|f| f.unique && f.mandatory)
            .map(|f| f.id.clone())
            .collect();
        push_mapped(&mut external_unique_id_fields, unique_fields, &entity_type.id);

        let parent_links = link_shapes(reader, &entity_type, unique_fields, true).map_err(host)?;
        let child_links = link_shapes(reader, &entity_type, unique_fields, false).map_err(host)?;

        Ok(Self {
            entity_type_id: entity_type.id.clone(),
            field_sets: entity_type.field_sets.clone(),
            external_unique_id_fields,
            languages,
            cvl_ids,
            fields,
            parent_links,
            child_links,
        })
    }

    /// Root key of this type's collection documents (`"<Type>s"`).
    pub fn collection_key(&self) -> String {
        collection_key(&self.entity_type_id)
    }

    /// Shape of one field, if declared.
    pub fn field(&self, field_type_id: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.field_type_id == field_type_id)
    }

    /// Whether `field_set_id` may appear on entities of this type.
    pub fn allows_field_set(&self, field_set_id: &str) -> bool {
        self.field_sets.iter().any(|f| f == field_set_id)
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let collection = self.collection_key();

        let mut root_properties = Map::new();
        root_properties.insert(
            collection.clone(),
            json!({ "type": "array", "items": { "$ref": "#/$defs/Entity" } }),
        );

        json!({
            "$schema": JSON_SCHEMA_DIALECT,
            "title": collection,
            "type": "object",
            "required": [collection],
            "additionalProperties": false,
            "properties": root_properties,
            "$defs": {
                "Entity": self.entity_schema(),
                "Language": enum_or_nothing(&self.languages),
                "LocaleString": locale_string_schema(),
                "CvlIds": enum_or_nothing(&self.cvl_ids),
                "SpecificationDataRow": specification_row_schema(),
                "SpecificationTemplateField": specification_template_schema(),
            }
        })
    }

    fn entity_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert("EntityId".into(), json!({ "type": "integer" }));
        properties.insert("Action".into(), json!({ "enum": ENTITY_ACTIONS }));
        if !self.field_sets.is_empty() {
            properties.insert("FieldSet".into(), json!({ "enum": self.field_sets }));
        }
        if !self.external_unique_id_fields.is_empty() {
            properties.insert(
                "ExternalUniqueIdField".into(),
                json!({ "enum": self.external_unique_id_fields }),
            );
        }
        properties.insert("Fields".into(), self.fields_schema());
        properties.insert(
            "Links".into(),
            json!({
                "type": "object",
                "required": ["ParentLinks", "ChildLinks"],
                "additionalProperties": false,
                "properties": {
                    "ParentLinks": links_schema(&self.parent_links, "SourceEntityId"),
                    "ChildLinks": links_schema(&self.child_links, "TargetEntityId"),
                }
            }),
        );
        properties.insert(
            "Additionals".into(),
            json!({
                "type": "object",
                "maxProperties": 1,
                "additionalProperties": false,
                "properties": {
                    "SpecificationData": {
                        "type": "array",
                        "items": { "$ref": "#/$defs/SpecificationDataRow" }
                    },
                    "SpecificationTemplate": {
                        "type": "array",
                        "items": { "$ref": "#/$defs/SpecificationTemplateField" }
                    }
                }
            }),
        );

        json!({
            "type": "object",
            "required": ["EntityId", "Action", "Fields", "Links"],
            "additionalProperties": false,
            "properties": properties,
        })
    }

    fn fields_schema(&self) -> Value {
        if self.fields.is_empty() {
            return json!({ "type": "array", "maxItems": 0 });
        }
        let variants: Vec<Value> = self.fields.iter().map(field_schema).collect();
        json!({ "type": "array", "items": { "oneOf": variants } })
    }
}

/// Root key of collection documents for `entity_type_id`.
pub fn collection_key(entity_type_id: &str) -> String {
    format!("{entity_type_id}s")
}

/// Append the field mapped for `entity_type_id` unless already listed.
fn push_mapped(names: &mut Vec<String>, unique_fields: &UniqueFieldMap, entity_type_id: &str) {
    if let Some(mapped) = unique_fields.get(entity_type_id) {
        if !names.iter().any(|n| n == mapped) {
            names.push(mapped.to_string());
        }
    }
}

fn link_shapes(
    reader: &dyn CatalogReader,
    entity_type: &EntityType,
    unique_fields: &UniqueFieldMap,
    inbound: bool,
) -> Result<Vec<LinkShape>, HostError> {
    let link_types: Vec<_> = if inbound {
        entity_type.inbound_link_types().collect()
    } else {
        entity_type.outbound_link_types().collect()
    };

    let mut shapes: Vec<LinkShape> = Vec::new();
    for link_type in link_types {
        if shapes.iter().any(|s| s.link_type_id == link_type.id) {
            continue;
        }
        let other_id = link_type.other_end(&entity_type.id);
        let other = if other_id == entity_type.id {
            entity_type.clone()
        } else {
            reader
                .entity_type(other_id)?
                .ok_or_else(|| HostError::not_found("entity type", other_id))?
        };

        let mut unique_field_names = vec![ENTITY_ID_FIELD.to_string()];
        unique_field_names.extend(
            other
                .field_types
                .iter()
                .filter(|f| f.unique)
                .map(|f| f.id.clone()),
        );
        push_mapped(&mut unique_field_names, unique_fields, &other.id);

        shapes.push(LinkShape {
            link_type_id: link_type.id.clone(),
            source_entity_type_id: link_type.source_entity_type_id.clone(),
            target_entity_type_id: link_type.target_entity_type_id.clone(),
            unique_field_names,
        });
    }
    Ok(shapes)
}

// ─── Schema fragments ───────────────────────────────────────────────

/// `{"enum": values}`, or a schema matching nothing when `values` is empty.
fn enum_or_nothing(values: &[String]) -> Value {
    if values.is_empty() {
        json!({ "not": {} })
    } else {
        json!({ "enum": values })
    }
}

fn field_schema(field: &FieldShape) -> Value {
    let mut properties = Map::new();
    properties.insert("FieldTypeId".into(), json!({ "const": field.field_type_id }));
    match &field.kind {
        FieldKind::Scalar => {
            properties.insert(
                "Data".into(),
                json!({ "type": "array", "items": { "type": "string" }, "minItems": 1, "maxItems": 1 }),
            );
        }
        FieldKind::LocaleString => {
            properties.insert("Data".into(), json!({ "$ref": "#/$defs/LocaleString" }));
        }
        FieldKind::Cvl {
            values, multivalue, ..
        } => {
            let mut data = json!({ "type": "array", "items": { "enum": values }, "minItems": 1 });
            if !multivalue {
                data["maxItems"] = json!(1);
            }
            properties.insert("Data".into(), data);
            properties.insert("Cvl".into(), json!({ "$ref": "#/$defs/CvlIds" }));
        }
    }
    json!({
        "type": "object",
        "required": ["FieldTypeId", "Data"],
        "additionalProperties": false,
        "properties": properties,
    })
}

fn links_schema(shapes: &[LinkShape], own_id_key: &str) -> Value {
    if shapes.is_empty() {
        return json!({ "type": "array", "maxItems": 0 });
    }
    let variants: Vec<Value> = shapes
        .iter()
        .map(|shape| {
            let mut properties = Map::new();
            properties.insert("LinkTypeId".into(), json!({ "const": shape.link_type_id }));
            properties.insert(
                "SourceEntityTypeId".into(),
                json!({ "const": shape.source_entity_type_id }),
            );
            properties.insert(
                "TargetEntityTypeId".into(),
                json!({ "const": shape.target_entity_type_id }),
            );
            properties.insert(
                "UniqueFieldName".into(),
                json!({ "enum": shape.unique_field_names }),
            );
            properties.insert("UniqueValue".into(), json!({ "type": "string" }));
            properties.insert(own_id_key.into(), json!({ "type": "integer" }));
            properties.insert("LinkEntityId".into(), json!({ "type": "integer" }));
            properties.insert("LinkEntityTypeId".into(), json!({ "type": "string" }));
            properties.insert("SortOrder".into(), json!({ "type": "integer" }));
            properties.insert("Action".into(), json!({ "enum": LINK_ACTIONS }));
            json!({
                "type": "object",
                "required": [
                    "LinkTypeId", "SourceEntityTypeId", "TargetEntityTypeId",
                    "UniqueFieldName", "UniqueValue", own_id_key, "SortOrder"
                ],
                "additionalProperties": false,
                "properties": properties,
            })
        })
        .collect();
    json!({ "type": "array", "items": { "oneOf": variants } })
}

fn locale_string_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["Language", "Value"],
            "additionalProperties": false,
            "properties": {
                "Language": { "$ref": "#/$defs/Language" },
                "Value": { "type": "string" }
            }
        }
    })
}

fn specification_row_schema() -> Value {
    json!({
        "type": "object",
        "required": ["SpecificationFieldTypeId", "Data"],
        "additionalProperties": false,
        "properties": {
            "SpecificationFieldTypeId": { "type": "string" },
            "Data": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "oneOf": [
                        {
                            "type": "object",
                            "required": ["Value"],
                            "additionalProperties": false,
                            "properties": {
                                "Value": { "type": "string" },
                                "Cvl": { "type": "string" }
                            }
                        },
                        {
                            "type": "object",
                            "required": ["LocaleString"],
                            "additionalProperties": false,
                            "properties": {
                                "LocaleString": { "$ref": "#/$defs/LocaleString" }
                            }
                        }
                    ]
                }
            }
        }
    })
}

fn specification_template_schema() -> Value {
    let text = json!({ "type": "string" });
    let locale = json!({ "$ref": "#/$defs/LocaleString" });
    let flag = json!({ "type": "boolean" });
    json!({
        "type": "object",
        "required": [
            "Id", "Name", "DataType", "Mandatory", "Index", "CategoryId", "CategoryName",
            "DefaultValue", "CVLId", "Multivalue", "Unit", "Additional"
        ],
        "additionalProperties": false,
        "properties": {
            "Id": text,
            "Name": locale,
            "DataType": text,
            "Mandatory": flag,
            "Index": { "type": "integer" },
            "CategoryId": text,
            "CategoryName": locale,
            "DefaultValue": text,
            "CVLId": text,
            "Multivalue": flag,
            "Unit": text,
            "Additional": text
        }
    })
}
